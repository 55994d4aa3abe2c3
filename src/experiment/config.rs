//! YAML simulation configuration.
//!
//! One file describes a data-generating process and a list of sample sizes;
//! each sample size becomes one [`ExperimentSpec`].
//!
//! ```yaml
//! name: normal_shift
//! sample_sizes: [100, 500]
//! replications: 1000
//! bootstrap_resamples: 200
//! confidence_levels: [0.9, 0.95]
//! seed: 42
//! distributions:
//!   control_pre:  { family: normal, mean: 0.0, sd: 1.0 }
//!   control_post: { family: normal, mean: 0.5, sd: 1.0 }
//!   treated_pre:  { family: normal, mean: 0.25, sd: 1.0 }
//!   treated_post: { family: normal, mean: 1.75, sd: 1.0 }
//! execution:
//!   threads: 4
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::spec::{
    ExperimentSpec, DEFAULT_BASE_SEED, DEFAULT_BOOTSTRAP_RESAMPLES, DEFAULT_MIN_SUCCESS_FRACTION,
    DEFAULT_REPLICATIONS,
};
use super::{GroupDistributions, GroupSizes};
use crate::bootstrap::IntervalMethod;
use crate::estimator::EstimatorSettings;
use crate::{Error, Result};

/// How the runner executes (not part of the experiment's identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Worker threads for replications (0 = one per core)
    pub threads: usize,
    /// Keep one diagnostic row per replication
    pub diagnostics: bool,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Experiment name, used in output file names
    pub name: String,
    /// Common size for all four groups, one experiment per entry
    #[serde(default)]
    pub sample_sizes: Vec<usize>,
    /// Explicit per-group sizes (alternative to `sample_sizes`)
    #[serde(default)]
    pub sizes: Option<GroupSizes>,
    /// Monte Carlo replications per experiment
    #[serde(default = "default_replications")]
    pub replications: usize,
    /// Bootstrap resamples per replication
    #[serde(default = "default_bootstrap_resamples")]
    pub bootstrap_resamples: usize,
    /// Nominal confidence levels
    #[serde(default = "default_confidence_levels")]
    pub confidence_levels: Vec<f64>,
    /// Base seed
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Declared group distributions
    pub distributions: GroupDistributions,
    /// Estimator settings
    #[serde(default)]
    pub estimator: EstimatorSettings,
    /// Bootstrap interval method
    #[serde(default)]
    pub bootstrap_interval: IntervalMethod,
    /// Minimum share of replications that must succeed
    #[serde(default = "default_min_success_fraction")]
    pub min_success_fraction: f64,
    /// Directory for summary records and trial tables
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
}

const fn default_replications() -> usize {
    DEFAULT_REPLICATIONS
}

const fn default_bootstrap_resamples() -> usize {
    DEFAULT_BOOTSTRAP_RESAMPLES
}

fn default_confidence_levels() -> Vec<f64> {
    super::spec::DEFAULT_CONFIDENCE_LEVELS.to_vec()
}

const fn default_seed() -> u64 {
    DEFAULT_BASE_SEED
}

const fn default_min_success_fraction() -> f64 {
    DEFAULT_MIN_SUCCESS_FRACTION
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl SimulationConfig {
    /// Read and parse a YAML file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::Yaml`] if it does
    /// not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        text.parse()
    }

    /// One validated spec per configured sample size.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if neither or both of `sample_sizes` and
    /// `sizes` are given, or if any resulting spec is invalid.
    pub fn experiments(&self) -> Result<Vec<ExperimentSpec>> {
        let all_sizes: Vec<GroupSizes> = match (&self.sizes, self.sample_sizes.is_empty()) {
            (Some(sizes), true) => vec![*sizes],
            (None, false) => self
                .sample_sizes
                .iter()
                .map(|&n| GroupSizes::uniform(n))
                .collect(),
            (Some(_), false) => {
                return Err(Error::Configuration(
                    "specify either `sample_sizes` or `sizes`, not both".into(),
                ))
            }
            (None, true) => {
                return Err(Error::Configuration(
                    "one of `sample_sizes` or `sizes` is required".into(),
                ))
            }
        };

        all_sizes
            .into_iter()
            .map(|sizes| {
                ExperimentSpec::builder(self.name.clone(), sizes, self.distributions.clone())
                    .replications(self.replications)
                    .bootstrap_resamples(self.bootstrap_resamples)
                    .confidence_levels(self.confidence_levels.clone())
                    .base_seed(self.seed)
                    .estimator(self.estimator)
                    .bootstrap_interval(self.bootstrap_interval)
                    .min_success_fraction(self.min_success_fraction)
                    .build()
            })
            .collect()
    }
}

impl FromStr for SimulationConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
name: minimal
sample_sizes: [50, 200]
distributions:
  control_pre:  { family: normal, mean: 0.0, sd: 1.0 }
  control_post: { family: normal, mean: 0.5, sd: 1.0 }
  treated_pre:  { family: normal, mean: 0.25, sd: 1.0 }
  treated_post: { family: normal, mean: 1.75, sd: 1.0 }
";

    #[test]
    fn test_defaults_applied() {
        let config: SimulationConfig = MINIMAL.parse().unwrap();
        assert_eq!(config.replications, DEFAULT_REPLICATIONS);
        assert_eq!(config.seed, DEFAULT_BASE_SEED);
        assert_eq!(config.execution, ExecutionConfig::default());
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_one_spec_per_sample_size() {
        let config: SimulationConfig = MINIMAL.parse().unwrap();
        let specs = config.experiments().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].sizes().min(), 50);
        assert_eq!(specs[1].sizes().min(), 200);
    }

    #[test]
    fn test_missing_sizes_rejected() {
        let text = MINIMAL.replace("sample_sizes: [50, 200]\n", "");
        let config: SimulationConfig = text.parse().unwrap();
        assert!(matches!(config.experiments(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = format!("{MINIMAL}bogus: 1\n");
        assert!(matches!(text.parse::<SimulationConfig>(), Err(Error::Yaml(_))));
    }
}
