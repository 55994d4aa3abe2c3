//! Replication Runner: one Monte Carlo study end to end
//!
//! ```text
//! for i in 0..R (parallel, chunked):
//!     seed_i   = replication_seed(base_seed, i)
//!     data     = generate(sizes, distributions, seed_i)
//!     estimate = CicEstimator::estimate(data)
//!     draws    = BootstrapEngine::run(data, bootstrap_seed(seed_i))
//! aggregate outcomes in index order -> SummaryRecord
//! ```
//!
//! Replications share nothing mutable. Results are collected per chunk and
//! handed to the [`Aggregator`] on the calling thread in index order, so the
//! summary is identical for every thread count.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::{Aggregator, SummaryRecord};
use crate::bootstrap::{BootstrapEngine, BootstrapResult};
use crate::data;
use crate::distribution::DistributionSet;
use crate::error::EstimationError;
use crate::estimator::{CicEstimator, EstimationResult};
use crate::experiment::ExperimentSpec;
use crate::seed;
use crate::truth;
use crate::{Error, Result};

/// Replications evaluated between cancellation checks.
pub const CHUNK_SIZE: usize = 64;

/// One successful replication.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    /// Replication index
    pub index: usize,
    /// Replication seed the dataset was generated from
    pub seed: u64,
    /// Population effect of the data-generating process
    pub true_effect: f64,
    /// Point estimate, asymptotic SE and intervals
    pub estimation: EstimationResult,
    /// Bootstrap draws, SE and intervals
    pub bootstrap: BootstrapResult,
}

/// Why a replication was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A group had fewer than two distinct values
    Degenerate,
    /// Treated-pre outcomes left the control-pre support
    OutOfSupport,
    /// Control-post density estimate vanished
    DensityVanished,
    /// Non-finite estimate, variance or bandwidth
    NonFinite,
    /// No bootstrap resample produced an estimate
    InsufficientResamples,
}

impl FailureKind {
    /// Snake-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Degenerate => "degenerate",
            Self::OutOfSupport => "out_of_support",
            Self::DensityVanished => "density_vanished",
            Self::NonFinite => "non_finite",
            Self::InsufficientResamples => "insufficient_resamples",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&EstimationError> for FailureKind {
    fn from(err: &EstimationError) -> Self {
        match err {
            EstimationError::Degenerate { .. } => Self::Degenerate,
            EstimationError::OutOfSupport { .. } => Self::OutOfSupport,
            EstimationError::DensityVanished { .. } => Self::DensityVanished,
            EstimationError::NonFinite(_) => Self::NonFinite,
        }
    }
}

/// One failed replication with its retained reason.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialFailure {
    /// Replication index
    pub index: usize,
    /// Replication seed, for replaying the failed trial
    pub seed: u64,
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable reason
    pub reason: String,
}

impl TrialFailure {
    /// Failure of the point or variance estimate on replication `index`.
    #[must_use]
    pub fn estimation(index: usize, seed: u64, err: &EstimationError) -> Self {
        Self {
            index,
            seed,
            kind: FailureKind::from(err),
            reason: err.to_string(),
        }
    }
}

/// Per-replication diagnostic row (kept only when requested).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    /// Replication index
    pub index: u64,
    /// Replication seed
    pub seed: u64,
    /// Point estimate
    pub estimate: Option<f64>,
    /// Asymptotic standard error
    pub std_error: Option<f64>,
    /// Bootstrap standard error
    pub bootstrap_std_error: Option<f64>,
    /// Control-post density bandwidth
    pub bandwidth: Option<f64>,
    /// Discarded bootstrap draws
    pub discarded_draws: u64,
    /// Failure label, if the replication failed
    pub failure: Option<String>,
}

impl TrialRow {
    fn new(result: &std::result::Result<TrialOutcome, TrialFailure>) -> Self {
        match result {
            Ok(outcome) => Self {
                index: outcome.index as u64,
                seed: outcome.seed,
                estimate: Some(outcome.estimation.estimate),
                std_error: Some(outcome.estimation.std_error),
                bootstrap_std_error: Some(outcome.bootstrap.std_error),
                bandwidth: Some(outcome.estimation.bandwidth),
                discarded_draws: outcome.bootstrap.discarded as u64,
                failure: None,
            },
            Err(failure) => Self {
                index: failure.index as u64,
                seed: failure.seed,
                estimate: None,
                std_error: None,
                bootstrap_std_error: None,
                bandwidth: None,
                discarded_draws: 0,
                failure: Some(failure.kind.label().to_string()),
            },
        }
    }
}

/// Execution options for [`ReplicationRunner::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker threads (0 = rayon default)
    pub threads: usize,
    /// Keep one [`TrialRow`] per replication
    pub diagnostics: bool,
    /// Checked between chunks; setting it aborts the run
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// Aggregate statistics
    pub summary: SummaryRecord,
    /// Diagnostic rows in index order (empty unless requested)
    pub trials: Vec<TrialRow>,
}

/// Runs the replications of one [`ExperimentSpec`].
#[derive(Debug)]
pub struct ReplicationRunner {
    spec: ExperimentSpec,
    distributions: DistributionSet,
    true_effect: f64,
    estimator: CicEstimator,
    bootstrap: BootstrapEngine,
}

impl ReplicationRunner {
    /// Validate the experiment spec, build its distributions and compute the true effect.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the experiment spec is invalid or its true effect is
    /// not finite.
    pub fn new(spec: ExperimentSpec) -> Result<Self> {
        spec.validate()?;
        let distributions = spec.distributions().build()?;
        let true_effect = truth::true_effect(&distributions)?;
        let estimator = CicEstimator::new(*spec.estimator());
        let bootstrap = BootstrapEngine::new(
            estimator,
            spec.bootstrap_resamples(),
            spec.confidence_levels().to_vec(),
            spec.bootstrap_interval(),
        );
        Ok(Self {
            spec,
            distributions,
            true_effect,
            estimator,
            bootstrap,
        })
    }

    /// The experiment being run.
    #[must_use]
    pub const fn spec(&self) -> &ExperimentSpec {
        &self.spec
    }

    /// Population effect of the data-generating process.
    #[must_use]
    pub const fn true_effect(&self) -> f64 {
        self.true_effect
    }

    /// Run replication `index`.
    ///
    /// Depends only on the experiment spec and `index`.
    ///
    /// # Errors
    ///
    /// A [`TrialFailure`] when the estimator fails on the generated data or
    /// no bootstrap draw survives.
    pub fn run_replication(&self, index: usize) -> std::result::Result<TrialOutcome, TrialFailure> {
        let replication_seed = seed::replication_seed(self.spec.base_seed(), index as u64);
        let dataset = data::generate(self.spec.sizes(), &self.distributions, replication_seed);

        let estimation = self
            .estimator
            .estimate(&dataset, self.spec.confidence_levels())
            .map_err(|e| TrialFailure::estimation(index, replication_seed, &e))?;

        let bootstrap = self
            .bootstrap
            .run(
                &dataset,
                estimation.estimate,
                seed::bootstrap_seed(replication_seed),
            )
            .map_err(|e| TrialFailure {
                index,
                seed: replication_seed,
                kind: FailureKind::InsufficientResamples,
                reason: e.to_string(),
            })?;

        debug!(
            replication = index,
            estimate = estimation.estimate,
            std_error = estimation.std_error,
            bootstrap_std_error = bootstrap.std_error,
            discarded = bootstrap.discarded,
            "replication finished"
        );

        Ok(TrialOutcome {
            index,
            seed: replication_seed,
            true_effect: self.true_effect,
            estimation,
            bootstrap,
        })
    }

    /// Run replications `range` in parallel, results in index order.
    fn run_chunk(&self, range: Range<usize>) -> Vec<std::result::Result<TrialOutcome, TrialFailure>> {
        range
            .into_par_iter()
            .map(|i| self.run_replication(i))
            .collect()
    }

    /// Run every replication and aggregate.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the cancellation flag is raised
    /// - [`Error::InsufficientTrials`] if too few replications succeed
    /// - [`Error::Other`] if the thread pool cannot be built
    pub fn run(&self, options: &RunOptions) -> Result<RunArtifacts> {
        let requested = self.spec.replications();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build thread pool: {e}")))?;

        info!(
            experiment = self.spec.name(),
            n = self.spec.sizes().min(),
            replications = requested,
            bootstrap = self.spec.bootstrap_resamples(),
            threads = pool.current_num_threads(),
            true_effect = self.true_effect,
            "starting Monte Carlo run"
        );
        let started = Instant::now();

        let mut aggregator = Aggregator::new(
            self.spec.confidence_levels().to_vec(),
            self.true_effect,
            self.spec.sizes().min(),
        );
        let mut trials = Vec::new();

        let mut completed = 0;
        while completed < requested {
            if options
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                warn!(completed, requested, "run cancelled");
                return Err(Error::Cancelled {
                    completed,
                    requested,
                });
            }
            let end = (completed + CHUNK_SIZE).min(requested);
            let results = pool.install(|| self.run_chunk(completed..end));
            for result in &results {
                match result {
                    Ok(outcome) => aggregator.push(outcome),
                    Err(failure) => {
                        warn!(
                            replication = failure.index,
                            kind = failure.kind.label(),
                            reason = %failure.reason,
                            "replication failed"
                        );
                        aggregator.record_failure(failure);
                    }
                }
                if options.diagnostics {
                    trials.push(TrialRow::new(result));
                }
            }
            completed = end;
        }

        let summary = aggregator.finish(&self.spec)?;
        info!(
            experiment = self.spec.name(),
            successful = summary.successful(),
            failed = summary.failed(),
            bias = summary.bias(),
            rmse = summary.rmse(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Monte Carlo run finished"
        );
        Ok(RunArtifacts { summary, trials })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::DistributionSpec;
    use crate::experiment::{GroupDistributions, GroupSizes};

    fn spec(replications: usize) -> ExperimentSpec {
        ExperimentSpec::builder(
            "runner",
            GroupSizes::uniform(400),
            GroupDistributions::location_shift(DistributionSpec::normal(0.0, 1.0), 0.5, 0.25, 1.0),
        )
        .replications(replications)
        .bootstrap_resamples(30)
        .min_success_fraction(0.5)
        .build()
        .unwrap()
    }

    #[test]
    fn test_replication_is_pure_function_of_index() {
        let runner = ReplicationRunner::new(spec(10)).unwrap();
        let a = runner.run_replication(3).unwrap();
        let b = runner.run_replication(3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.seed, seed::replication_seed(runner.spec().base_seed(), 3));
        let c = runner.run_replication(4).unwrap();
        assert_ne!(a.seed, c.seed);
        assert_ne!(a.estimation.estimate, c.estimation.estimate);
    }

    #[test]
    fn test_run_with_diagnostics() {
        let runner = ReplicationRunner::new(spec(20)).unwrap();
        let options = RunOptions {
            threads: 2,
            diagnostics: true,
            cancel: None,
        };
        let artifacts = runner.run(&options).unwrap();
        assert_eq!(artifacts.trials.len(), 20);
        assert!(artifacts
            .trials
            .iter()
            .enumerate()
            .all(|(i, row)| row.index == i as u64
                && row.seed == seed::replication_seed(runner.spec().base_seed(), i as u64)));
        assert_eq!(
            artifacts.summary.successful() + artifacts.summary.failed(),
            20
        );
    }

    #[test]
    fn test_cancelled_before_start() {
        let runner = ReplicationRunner::new(spec(10)).unwrap();
        let options = RunOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..RunOptions::default()
        };
        let err = runner.run(&options).unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled {
                completed: 0,
                requested: 10
            }
        ));
    }

    #[test]
    fn test_failure_kind_from_estimation_error() {
        let err = EstimationError::NonFinite("variance");
        assert_eq!(FailureKind::from(&err), FailureKind::NonFinite);
        assert_eq!(FailureKind::InsufficientResamples.to_string(), "insufficient_resamples");
    }
}
