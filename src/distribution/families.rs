//! Parametric outcome families.
//!
//! Normal probabilities come from `statrs`; the remaining families have
//! closed-form CDFs and quantile functions.

use statrs::distribution::{ContinuousCDF, Normal};

use super::OutcomeDistribution;
use crate::{Error, Result};

/// A parametric family with analytic CDF, quantile and mean.
///
/// Parameters are assumed validated by [`super::DistributionSpec::build`].
#[derive(Debug, Clone)]
pub enum Parametric {
    /// Normal(mean, sd)
    Normal {
        /// `statrs` normal with the same parameters
        dist: Normal,
        /// Location
        mean: f64,
    },
    /// Exponential(rate)
    Exponential {
        /// Rate
        rate: f64,
    },
    /// Pareto type I(shape, scale)
    Pareto {
        /// Tail index
        shape: f64,
        /// Lower support bound
        scale: f64,
    },
    /// Uniform(low, high)
    Uniform {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },
    /// LogNormal(mu, sigma)
    LogNormal {
        /// Normal law of the log outcome
        log_scale: Normal,
        /// Log-scale location
        mu: f64,
        /// Log-scale standard deviation
        sigma: f64,
    },
}

fn standard_normal_error(e: impl std::fmt::Display) -> Error {
    Error::Configuration(format!("invalid normal parameters: {e}"))
}

impl Parametric {
    /// Normal(mean, sd).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `statrs` rejects the parameters.
    pub fn normal(mean: f64, sd: f64) -> Result<Self> {
        Normal::new(mean, sd)
            .map(|dist| Self::Normal { dist, mean })
            .map_err(standard_normal_error)
    }

    /// Exponential(rate).
    ///
    /// # Errors
    ///
    /// Never fails for a validated rate; kept fallible for symmetry.
    pub const fn exponential(rate: f64) -> Result<Self> {
        Ok(Self::Exponential { rate })
    }

    /// Pareto(shape, scale).
    ///
    /// # Errors
    ///
    /// Never fails for validated parameters; kept fallible for symmetry.
    pub const fn pareto(shape: f64, scale: f64) -> Result<Self> {
        Ok(Self::Pareto { shape, scale })
    }

    /// Uniform(low, high).
    ///
    /// # Errors
    ///
    /// Never fails for validated parameters; kept fallible for symmetry.
    pub const fn uniform(low: f64, high: f64) -> Result<Self> {
        Ok(Self::Uniform { low, high })
    }

    /// LogNormal(mu, sigma).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `statrs` rejects the parameters.
    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self> {
        Normal::new(mu, sigma)
            .map(|log_scale| Self::LogNormal {
                log_scale,
                mu,
                sigma,
            })
            .map_err(standard_normal_error)
    }
}

impl OutcomeDistribution for Parametric {
    fn cdf(&self, x: f64) -> f64 {
        match self {
            Self::Normal { dist, .. } => dist.cdf(x),
            Self::Exponential { rate } => {
                if x <= 0.0 {
                    0.0
                } else {
                    -(-rate * x).exp_m1()
                }
            }
            Self::Pareto { shape, scale } => {
                if x <= *scale {
                    0.0
                } else {
                    1.0 - (scale / x).powf(*shape)
                }
            }
            Self::Uniform { low, high } => ((x - low) / (high - low)).clamp(0.0, 1.0),
            Self::LogNormal { log_scale, .. } => {
                if x <= 0.0 {
                    0.0
                } else {
                    log_scale.cdf(x.ln())
                }
            }
        }
    }

    fn quantile(&self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        match self {
            Self::Normal { dist, .. } => dist.inverse_cdf(p),
            Self::Exponential { rate } => -(-p).ln_1p() / rate,
            Self::Pareto { shape, scale } => scale * (1.0 - p).powf(-1.0 / shape),
            Self::Uniform { low, high } => p.mul_add(high - low, *low),
            Self::LogNormal { log_scale, .. } => log_scale.inverse_cdf(p).exp(),
        }
    }

    fn sf(&self, x: f64) -> f64 {
        match self {
            Self::Normal { dist, .. } => dist.sf(x),
            Self::Exponential { rate } => {
                if x <= 0.0 {
                    1.0
                } else {
                    (-rate * x).exp()
                }
            }
            Self::Pareto { shape, scale } => {
                if x <= *scale {
                    1.0
                } else {
                    (scale / x).powf(*shape)
                }
            }
            Self::Uniform { low, high } => ((high - x) / (high - low)).clamp(0.0, 1.0),
            Self::LogNormal { log_scale, .. } => {
                if x <= 0.0 {
                    1.0
                } else {
                    log_scale.sf(x.ln())
                }
            }
        }
    }

    fn upper_quantile(&self, q: f64) -> f64 {
        let q = q.clamp(0.0, 1.0);
        match self {
            Self::Normal { dist, mean } => 2.0f64.mul_add(*mean, -dist.inverse_cdf(q)),
            Self::Exponential { rate } => -q.ln() / rate,
            Self::Pareto { shape, scale } => scale * q.powf(-1.0 / shape),
            Self::Uniform { low, high } => (-q).mul_add(high - low, *high),
            Self::LogNormal { log_scale, mu, .. } => {
                2.0f64.mul_add(*mu, -log_scale.inverse_cdf(q)).exp()
            }
        }
    }

    fn mean(&self) -> Option<f64> {
        let mean = match self {
            Self::Normal { mean, .. } => *mean,
            Self::Exponential { rate } => 1.0 / rate,
            Self::Pareto { shape, scale } => {
                if *shape > 1.0 {
                    shape * scale / (shape - 1.0)
                } else {
                    f64::INFINITY
                }
            }
            Self::Uniform { low, high } => 0.5 * (low + high),
            Self::LogNormal { mu, sigma, .. } => (0.5 * sigma).mul_add(*sigma, *mu).exp(),
        };
        Some(mean)
    }
}
