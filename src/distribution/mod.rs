//! Distribution Provider
//!
//! Supplies the outcome distributions of the data-generating process. Every
//! distribution exposes the capability set the simulation needs:
//!
//! - `sample(n)` to draw i.i.d. outcomes (inverse-transform sampling),
//! - `quantile(p)` and `cdf(x)` to compute the true CiC effect analytically,
//!   with `upper_quantile(q)` and `sf(x)` as their precise upper-tail forms,
//! - `mean()` when a closed form exists.
//!
//! Concrete variants are selected from a declarative [`DistributionSpec`]:
//!
//! ```rust
//! use cic_sim::distribution::DistributionSpec;
//!
//! let spec = DistributionSpec::shifted(DistributionSpec::normal(0.0, 1.0), 0.5);
//! let dist = spec.build()?;
//! assert!((dist.quantile(0.5) - 0.5).abs() < 1e-9);
//! # Ok::<(), cic_sim::Error>(())
//! ```

mod families;
mod transform;

pub use families::Parametric;
pub use transform::{Affine, ExpTransform};

use std::fmt;
use std::sync::Arc;

use rand::distributions::Open01;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::data::Group;
use crate::{Error, Result};

/// Capability interface for an outcome distribution.
pub trait OutcomeDistribution: Send + Sync + fmt::Debug {
    /// Cumulative distribution function `P(X <= x)`.
    fn cdf(&self, x: f64) -> f64;

    /// Quantile function (inverse CDF) for `p` in `[0, 1]`.
    fn quantile(&self, p: f64) -> f64;

    /// Survival function `P(X > x)`.
    ///
    /// Families override this where `1 - cdf(x)` cancels in the upper tail.
    fn sf(&self, x: f64) -> f64 {
        1.0 - self.cdf(x)
    }

    /// Upper-tail quantile: the `x` with `P(X > x) = q`.
    ///
    /// The default rounds `1 - q`; families override it to stay exact for
    /// tiny `q`.
    fn upper_quantile(&self, q: f64) -> f64 {
        self.quantile(1.0 - q)
    }

    /// Population mean, when available in closed form.
    fn mean(&self) -> Option<f64> {
        None
    }

    /// Draw `n` independent outcomes.
    ///
    /// Uses inverse-transform sampling on uniforms from the open interval
    /// `(0, 1)`, so unbounded quantile functions never return infinities.
    fn sample(&self, rng: &mut dyn RngCore, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| {
                let u: f64 = rng.sample(Open01);
                self.quantile(u)
            })
            .collect()
    }
}

/// Shared handle to a built distribution.
pub type SharedDistribution = Arc<dyn OutcomeDistribution>;

/// The four built group distributions of a CiC data-generating process.
#[derive(Debug, Clone)]
pub struct DistributionSet {
    groups: [SharedDistribution; 4],
}

impl DistributionSet {
    /// Assemble from per-group distributions.
    #[must_use]
    pub fn new(
        control_pre: SharedDistribution,
        control_post: SharedDistribution,
        treated_pre: SharedDistribution,
        treated_post: SharedDistribution,
    ) -> Self {
        Self {
            groups: [control_pre, control_post, treated_pre, treated_post],
        }
    }

    /// Distribution of `group`.
    #[must_use]
    pub fn get(&self, group: Group) -> &dyn OutcomeDistribution {
        self.groups[group.index()].as_ref()
    }
}

/// Declarative description of an outcome distribution.
///
/// Deserialized from configuration with a `family` tag, e.g.
///
/// ```yaml
/// family: shifted
/// shift: 1.0
/// base: { family: normal, mean: 0.0, sd: 1.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DistributionSpec {
    /// Normal with mean and standard deviation
    Normal {
        /// Location
        mean: f64,
        /// Standard deviation (> 0)
        sd: f64,
    },
    /// Exponential with rate `lambda` (mean `1 / lambda`)
    Exponential {
        /// Rate (> 0)
        rate: f64,
    },
    /// Pareto type I with support `[scale, inf)`
    Pareto {
        /// Tail index (> 0)
        shape: f64,
        /// Minimum value (> 0)
        #[serde(default = "default_pareto_scale")]
        scale: f64,
    },
    /// Continuous uniform on `[low, high]`
    Uniform {
        /// Lower bound
        low: f64,
        /// Upper bound (> low)
        high: f64,
    },
    /// Log-normal: `exp(N(mu, sigma^2))`
    LogNormal {
        /// Log-scale location
        mu: f64,
        /// Log-scale standard deviation (> 0)
        sigma: f64,
    },
    /// Location shift `X + shift`
    Shifted {
        /// Distribution of `X`
        base: Box<DistributionSpec>,
        /// Additive shift
        shift: f64,
    },
    /// Increasing affine map `scale * X + shift`
    Affine {
        /// Distribution of `X`
        base: Box<DistributionSpec>,
        /// Multiplicative factor (> 0)
        scale: f64,
        /// Additive shift
        shift: f64,
    },
    /// Increasing nonlinear map `exp(X)`
    Exp {
        /// Distribution of `X`
        base: Box<DistributionSpec>,
    },
}

const fn default_pareto_scale() -> f64 {
    1.0
}

impl DistributionSpec {
    /// Normal distribution.
    #[must_use]
    pub const fn normal(mean: f64, sd: f64) -> Self {
        Self::Normal { mean, sd }
    }

    /// Exponential distribution.
    #[must_use]
    pub const fn exponential(rate: f64) -> Self {
        Self::Exponential { rate }
    }

    /// Pareto type I distribution.
    #[must_use]
    pub const fn pareto(shape: f64, scale: f64) -> Self {
        Self::Pareto { shape, scale }
    }

    /// Uniform distribution.
    #[must_use]
    pub const fn uniform(low: f64, high: f64) -> Self {
        Self::Uniform { low, high }
    }

    /// `base + shift`.
    #[must_use]
    pub fn shifted(base: Self, shift: f64) -> Self {
        Self::Shifted {
            base: Box::new(base),
            shift,
        }
    }

    /// `scale * base + shift`.
    #[must_use]
    pub fn affine(base: Self, scale: f64, shift: f64) -> Self {
        Self::Affine {
            base: Box::new(base),
            scale,
            shift,
        }
    }

    /// `exp(base)`.
    #[must_use]
    pub fn exp(base: Self) -> Self {
        Self::Exp {
            base: Box::new(base),
        }
    }

    /// Validate parameters and build the sampler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for non-finite parameters, non-positive
    /// scales/rates/shapes or an empty uniform range.
    pub fn build(&self) -> Result<SharedDistribution> {
        let dist: SharedDistribution = match self {
            Self::Normal { mean, sd } => {
                Arc::new(Parametric::normal(finite("mean", *mean)?, positive("sd", *sd)?)?)
            }
            Self::Exponential { rate } => {
                Arc::new(Parametric::exponential(positive("rate", *rate)?)?)
            }
            Self::Pareto { shape, scale } => Arc::new(Parametric::pareto(
                positive("shape", *shape)?,
                positive("scale", *scale)?,
            )?),
            Self::Uniform { low, high } => {
                let (low, high) = (finite("low", *low)?, finite("high", *high)?);
                if low >= high {
                    return Err(Error::Configuration(format!(
                        "uniform requires low < high, got low={low}, high={high}"
                    )));
                }
                Arc::new(Parametric::uniform(low, high)?)
            }
            Self::LogNormal { mu, sigma } => Arc::new(Parametric::log_normal(
                finite("mu", *mu)?,
                positive("sigma", *sigma)?,
            )?),
            Self::Shifted { base, shift } => {
                Arc::new(Affine::new(base.build()?, 1.0, finite("shift", *shift)?))
            }
            Self::Affine { base, scale, shift } => Arc::new(Affine::new(
                base.build()?,
                positive("scale", *scale)?,
                finite("shift", *shift)?,
            )),
            Self::Exp { base } => Arc::new(ExpTransform::new(base.build()?)),
        };
        Ok(dist)
    }
}

impl fmt::Display for DistributionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal { mean, sd } => write!(f, "N({mean}, {sd}^2)"),
            Self::Exponential { rate } => write!(f, "Exp({rate})"),
            Self::Pareto { shape, scale } => write!(f, "Pareto({shape}, {scale})"),
            Self::Uniform { low, high } => write!(f, "U({low}, {high})"),
            Self::LogNormal { mu, sigma } => write!(f, "LogN({mu}, {sigma}^2)"),
            Self::Shifted { base, shift } => write!(f, "{base} + {shift}"),
            Self::Affine { base, scale, shift } => write!(f, "{scale}*[{base}] + {shift}"),
            Self::Exp { base } => write!(f, "exp({base})"),
        }
    }
}

fn finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::Configuration(format!(
            "parameter `{name}` must be finite, got {value}"
        )))
    }
}

fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Configuration(format!(
            "parameter `{name}` must be positive and finite, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_negative_scale_is_configuration_error() {
        let err = DistributionSpec::normal(0.0, -1.0).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("sd"));
    }

    #[test]
    fn test_nested_transform_validates_base() {
        let spec = DistributionSpec::shifted(DistributionSpec::exponential(0.0), 1.0);
        assert!(matches!(spec.build(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_empty_uniform_rejected() {
        assert!(DistributionSpec::uniform(1.0, 1.0).build().is_err());
    }

    #[test]
    fn test_sample_is_finite_and_sized() {
        let dist = DistributionSpec::normal(2.0, 0.5).build().unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let draws = dist.sample(&mut rng, 1000);
        assert_eq!(draws.len(), 1000);
        assert!(draws.iter().all(|x| x.is_finite()));
        let mean = draws.iter().sum::<f64>() / 1000.0;
        assert!((mean - 2.0).abs() < 0.1, "sample mean {mean}");
    }

    #[test]
    fn test_yaml_representation() {
        let yaml = "family: shifted\nshift: 1.5\nbase:\n  family: normal\n  mean: 0.0\n  sd: 1.0\n";
        let spec: DistributionSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            spec,
            DistributionSpec::shifted(DistributionSpec::normal(0.0, 1.0), 1.5)
        );
    }

    #[test]
    fn test_pareto_scale_defaults_to_one() {
        let spec: DistributionSpec = serde_yaml::from_str("family: pareto\nshape: 3.0\n").unwrap();
        assert_eq!(spec, DistributionSpec::pareto(3.0, 1.0));
    }

    #[test]
    fn test_unknown_family_rejected() {
        let parsed: std::result::Result<DistributionSpec, _> =
            serde_yaml::from_str("family: cauchy\nlocation: 0.0\n");
        assert!(parsed.is_err());
    }
}
