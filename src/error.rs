//! Error types for cic-sim
//!
//! Two scopes of failure exist. Run-level errors (bad configuration, too few
//! successful trials, I/O) abort the whole experiment. Trial-level errors
//! (`EstimationError`, insufficient bootstrap draws) only exclude a single
//! replication, which the aggregator then counts.

use thiserror::Error;

use crate::data::Group;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// cic-sim error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unsupported experiment configuration (fatal, raised before any replication)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The CiC estimator is undefined for one dataset
    #[error("Estimation error: {0}")]
    Estimation(#[from] EstimationError),

    /// Every bootstrap resample of a replication failed to produce an estimate
    #[error("Insufficient bootstrap resamples: {retained} of {requested} draws retained")]
    InsufficientResamples {
        /// Draws that produced a finite estimate
        retained: usize,
        /// Draws requested by the experiment
        requested: usize,
    },

    /// Too many replications failed for the summary statistics to be meaningful
    #[error(
        "Insufficient trials: {successful} of {requested} replications succeeded, at least {required} required"
    )]
    InsufficientTrials {
        /// Replications that produced a trial outcome
        successful: usize,
        /// Minimum number of successful replications
        required: usize,
        /// Replications requested by the experiment
        requested: usize,
    },

    /// The run was cancelled before all replications finished
    #[error("Run cancelled after {completed} of {requested} replications")]
    Cancelled {
        /// Replications handed to the aggregator before cancellation
        completed: usize,
        /// Replications requested by the experiment
        requested: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of summary records
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Arrow error (trial tables)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error (trial tables)
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Reasons the CiC estimator cannot be computed on a dataset.
///
/// These are recoverable: the replication (or bootstrap draw) is discarded
/// and counted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    /// A group's empirical distribution has fewer than two distinct values
    #[error("group {group} has {distinct} distinct value(s), at least 2 required")]
    Degenerate {
        /// Offending group
        group: Group,
        /// Number of distinct values observed
        distinct: usize,
    },

    /// Too many treated-pre outcomes fall outside the control-pre support
    #[error(
        "{outside} of {total} treated-pre outcomes lie outside the control-pre support (tolerance {tolerance})"
    )]
    OutOfSupport {
        /// Outcomes outside `[min, max]` of control-pre
        outside: usize,
        /// Treated-pre sample size
        total: usize,
        /// Allowed share of outside outcomes
        tolerance: f64,
    },

    /// Kernel density of control-post vanished at a counterfactual outcome
    #[error("control-post density estimate is {density} at counterfactual outcome {at}")]
    DensityVanished {
        /// Evaluation point
        at: f64,
        /// Estimated density
        density: f64,
    },

    /// A quantity that must be finite was not
    #[error("non-finite {0}")]
    NonFinite(&'static str),
}

impl EstimationError {
    /// Short machine-friendly label, used in failure tallies.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Degenerate { .. } => "degenerate",
            Self::OutOfSupport { .. } => "out_of_support",
            Self::DensityVanished { .. } => "density_vanished",
            Self::NonFinite(_) => "non_finite",
        }
    }
}
