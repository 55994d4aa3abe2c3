//! Experiment definition
//!
//! An experiment pairs a data-generating process with Monte Carlo settings.
//!
//! ```text
//! SimulationConfig (YAML) ──< ExperimentSpec (one per sample size)
//!                                 ├── GroupSizes
//!                                 └── GroupDistributions ──> DistributionSet
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use cic_sim::distribution::DistributionSpec;
//! use cic_sim::experiment::{ExperimentSpec, GroupDistributions, GroupSizes};
//!
//! let model = GroupDistributions::location_shift(DistributionSpec::normal(0.0, 1.0), 0.5, 0.25, 1.0);
//! let spec = ExperimentSpec::builder("normal_shift", GroupSizes::uniform(500), model)
//!     .replications(100)
//!     .bootstrap_resamples(50)
//!     .build()?;
//! assert_eq!(spec.confidence_levels(), &[0.9, 0.95]);
//! # Ok::<(), cic_sim::Error>(())
//! ```

mod config;
mod groups;
mod spec;

pub use config::{ExecutionConfig, SimulationConfig};
pub use groups::{GroupDistributions, GroupSizes};
pub use spec::{
    ExperimentSpec, ExperimentSpecBuilder, DEFAULT_BASE_SEED, DEFAULT_BOOTSTRAP_RESAMPLES,
    DEFAULT_CONFIDENCE_LEVELS, DEFAULT_MIN_SUCCESS_FRACTION, DEFAULT_REPLICATIONS,
};
