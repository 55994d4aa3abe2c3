//! Experiment Spec - immutable configuration of one Monte Carlo study

use serde::{Deserialize, Serialize};

use super::{GroupDistributions, GroupSizes};
use crate::bootstrap::IntervalMethod;
use crate::estimator::EstimatorSettings;
use crate::{Error, Result};

/// Default number of Monte Carlo replications.
pub const DEFAULT_REPLICATIONS: usize = 1000;
/// Default number of bootstrap resamples per replication.
pub const DEFAULT_BOOTSTRAP_RESAMPLES: usize = 200;
/// Default nominal confidence levels.
pub const DEFAULT_CONFIDENCE_LEVELS: [f64; 2] = [0.90, 0.95];
/// Default base seed.
pub const DEFAULT_BASE_SEED: u64 = 42;
/// Default minimum share of replications that must succeed.
pub const DEFAULT_MIN_SUCCESS_FRACTION: f64 = 0.9;

/// One fully validated experiment: a data-generating process, sample sizes
/// and Monte Carlo settings.
///
/// Built through [`ExperimentSpecBuilder`], which validates every field.
/// Serialized verbatim into each summary record so results stay
/// self-describing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentSpec {
    name: String,
    sizes: GroupSizes,
    replications: usize,
    bootstrap_resamples: usize,
    distributions: GroupDistributions,
    confidence_levels: Vec<f64>,
    base_seed: u64,
    estimator: EstimatorSettings,
    bootstrap_interval: IntervalMethod,
    min_success_fraction: f64,
}

impl ExperimentSpec {
    /// Create a builder with the required fields.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        sizes: GroupSizes,
        distributions: GroupDistributions,
    ) -> ExperimentSpecBuilder {
        ExperimentSpecBuilder::new(name, sizes, distributions)
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the per-group sample sizes.
    #[must_use]
    pub const fn sizes(&self) -> &GroupSizes {
        &self.sizes
    }

    /// Get the number of replications.
    #[must_use]
    pub const fn replications(&self) -> usize {
        self.replications
    }

    /// Get the number of bootstrap resamples per replication.
    #[must_use]
    pub const fn bootstrap_resamples(&self) -> usize {
        self.bootstrap_resamples
    }

    /// Get the declared group distributions.
    #[must_use]
    pub const fn distributions(&self) -> &GroupDistributions {
        &self.distributions
    }

    /// Get the nominal confidence levels, ascending and unique.
    #[must_use]
    pub fn confidence_levels(&self) -> &[f64] {
        &self.confidence_levels
    }

    /// Get the base seed.
    #[must_use]
    pub const fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Get the estimator settings.
    #[must_use]
    pub const fn estimator(&self) -> &EstimatorSettings {
        &self.estimator
    }

    /// Get the bootstrap interval method.
    #[must_use]
    pub const fn bootstrap_interval(&self) -> IntervalMethod {
        self.bootstrap_interval
    }

    /// Get the minimum share of replications that must succeed.
    #[must_use]
    pub const fn min_success_fraction(&self) -> f64 {
        self.min_success_fraction
    }

    /// Minimum number of successful replications: `max(1, ceil(f * R))`.
    #[must_use]
    pub fn required_successes(&self) -> usize {
        let exact = self.min_success_fraction * self.replications as f64;
        let required = (exact - 1e-9).ceil() as usize;
        required.max(1)
    }

    /// Re-check every invariant (used after deserialization).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("experiment name must not be empty".into()));
        }
        self.sizes.validate()?;
        if self.replications == 0 {
            return Err(Error::Configuration("replications must be positive".into()));
        }
        if self.bootstrap_resamples == 0 {
            return Err(Error::Configuration("bootstrap_resamples must be positive".into()));
        }
        if self.confidence_levels.is_empty() {
            return Err(Error::Configuration(
                "at least one confidence level is required".into(),
            ));
        }
        if let Some(level) = self
            .confidence_levels
            .iter()
            .find(|l| !(l.is_finite() && **l > 0.0 && **l < 1.0))
        {
            return Err(Error::Configuration(format!(
                "confidence levels must be in (0, 1), got {level}"
            )));
        }
        if !(self.min_success_fraction > 0.0 && self.min_success_fraction <= 1.0) {
            return Err(Error::Configuration(format!(
                "min_success_fraction must be in (0, 1], got {}",
                self.min_success_fraction
            )));
        }
        self.estimator.validate()?;
        self.distributions.build()?;
        Ok(())
    }
}

/// Builder for `ExperimentSpec`.
#[derive(Debug)]
pub struct ExperimentSpecBuilder {
    spec: ExperimentSpec,
}

impl ExperimentSpecBuilder {
    /// Create a new builder with required fields and defaults for the rest.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        sizes: GroupSizes,
        distributions: GroupDistributions,
    ) -> Self {
        Self {
            spec: ExperimentSpec {
                name: name.into(),
                sizes,
                replications: DEFAULT_REPLICATIONS,
                bootstrap_resamples: DEFAULT_BOOTSTRAP_RESAMPLES,
                distributions,
                confidence_levels: DEFAULT_CONFIDENCE_LEVELS.to_vec(),
                base_seed: DEFAULT_BASE_SEED,
                estimator: EstimatorSettings::default(),
                bootstrap_interval: IntervalMethod::default(),
                min_success_fraction: DEFAULT_MIN_SUCCESS_FRACTION,
            },
        }
    }

    /// Set the number of replications.
    #[must_use]
    pub const fn replications(mut self, replications: usize) -> Self {
        self.spec.replications = replications;
        self
    }

    /// Set the number of bootstrap resamples.
    #[must_use]
    pub const fn bootstrap_resamples(mut self, resamples: usize) -> Self {
        self.spec.bootstrap_resamples = resamples;
        self
    }

    /// Set the nominal confidence levels.
    #[must_use]
    pub fn confidence_levels(mut self, levels: impl Into<Vec<f64>>) -> Self {
        self.spec.confidence_levels = levels.into();
        self
    }

    /// Set the base seed.
    #[must_use]
    pub const fn base_seed(mut self, seed: u64) -> Self {
        self.spec.base_seed = seed;
        self
    }

    /// Set the estimator settings.
    #[must_use]
    pub const fn estimator(mut self, settings: EstimatorSettings) -> Self {
        self.spec.estimator = settings;
        self
    }

    /// Set the bootstrap interval method.
    #[must_use]
    pub const fn bootstrap_interval(mut self, method: IntervalMethod) -> Self {
        self.spec.bootstrap_interval = method;
        self
    }

    /// Set the minimum share of replications that must succeed, in `(0, 1]`.
    #[must_use]
    pub const fn min_success_fraction(mut self, fraction: f64) -> Self {
        self.spec.min_success_fraction = fraction;
        self
    }

    /// Sort and deduplicate the levels, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any field is out of range or a
    /// distribution is not fully parameterized.
    pub fn build(mut self) -> Result<ExperimentSpec> {
        self.spec.confidence_levels.sort_by(f64::total_cmp);
        self.spec.confidence_levels.dedup();
        self.spec.validate()?;
        Ok(self.spec)
    }
}
