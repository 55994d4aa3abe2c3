//! # cic-sim: Monte Carlo study of Change-in-Change confidence intervals
//!
//! **Version**: 0.1.0
//!
//! cic-sim measures how well asymptotic (influence-function) and bootstrap
//! confidence intervals for the Change-in-Change estimator of Athey & Imbens
//! (2006) cover the true treatment effect in finite samples.
//!
//! ## Pipeline
//!
//! ```text
//! ExperimentSpec ─> Distribution Provider ─> Data Generator ─> Estimator Engine
//!                                                          └─> Bootstrap Engine
//!                   Replication Runner (R times, parallel) ─> Aggregator ─> SummaryRecord
//! ```
//!
//! ## Design Principles
//!
//! - **Reproducibility**: every random stream is a pure function of the base
//!   seed and its (replication, group | resample) index
//! - **No silent extrapolation**: undefined estimates are explicit, counted
//!   failures
//! - **Thread-count invariance**: aggregation happens in replication order
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cic_sim::distribution::DistributionSpec;
//! use cic_sim::experiment::{ExperimentSpec, GroupDistributions, GroupSizes};
//!
//! let model = GroupDistributions::location_shift(DistributionSpec::normal(0.0, 1.0), 0.5, 0.25, 1.0);
//! let spec = ExperimentSpec::builder("normal_shift", GroupSizes::uniform(500), model)
//!     .replications(1000)
//!     .bootstrap_resamples(200)
//!     .base_seed(42)
//!     .build()?;
//!
//! let summary = cic_sim::run_experiment(&spec)?;
//! println!("{}", cic_sim::report::performance_report(&summary));
//! # Ok::<(), cic_sim::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod aggregate;
pub mod bootstrap;
pub mod data;
pub mod distribution;
pub mod error;
pub mod estimator;
pub mod experiment;
pub mod report;
pub mod runner;
pub mod seed;
pub mod storage;
pub mod truth;

pub use aggregate::{Aggregator, CoverageEntry, SummaryRecord};
pub use bootstrap::{BootstrapEngine, BootstrapResult, IntervalMethod};
pub use data::{Group, SyntheticDataset};
pub use error::{Error, EstimationError, Result};
pub use estimator::{CicEstimator, ConfidenceInterval, EstimationResult, EstimatorSettings};
pub use experiment::{ExperimentSpec, GroupDistributions, GroupSizes, SimulationConfig};
pub use runner::{ReplicationRunner, RunArtifacts, RunOptions, TrialOutcome};

/// Run one experiment end to end with default execution options.
///
/// # Errors
///
/// - [`Error::Configuration`] if the experiment spec is invalid
/// - [`Error::InsufficientTrials`] if too many replications fail
pub fn run_experiment(spec: &ExperimentSpec) -> Result<SummaryRecord> {
    let runner = ReplicationRunner::new(spec.clone())?;
    Ok(runner.run(&RunOptions::default())?.summary)
}
