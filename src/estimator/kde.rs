//! Kernel density estimation for the asymptotic variance.
//!
//! The influence function of the CiC estimator divides by the control-post
//! density at each counterfactual outcome. That density is estimated with a
//! fixed-bandwidth kernel estimator:
//!
//! ```text
//! f(x) = 1/(n h) * sum_i K((x - Y_i) / h)
//! ```
//!
//! Bandwidth rules (Silverman 1986, Scott 1992):
//! - Silverman: `h = 0.9 * min(sd, IQR / 1.34) * n^(-1/5)`
//! - Scott:     `h = 1.06 * sd * n^(-1/5)`

use serde::{Deserialize, Serialize};

use super::ecdf::EmpiricalDistribution;
use crate::error::EstimationError;

/// `1 / sqrt(2 pi)`
const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Gaussian kernel mass beyond 8 bandwidths is below 1e-15.
const GAUSSIAN_CUTOFF: f64 = 8.0;

/// Smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// Standard normal density
    #[default]
    Gaussian,
    /// `3/4 (1 - u^2)` on `[-1, 1]`
    Epanechnikov,
}

impl Kernel {
    /// Kernel weight at standardized distance `u`.
    #[must_use]
    pub fn weight(self, u: f64) -> f64 {
        match self {
            Self::Gaussian => FRAC_1_SQRT_2PI * (-0.5 * u * u).exp(),
            Self::Epanechnikov => {
                if u.abs() <= 1.0 {
                    0.75 * u.mul_add(-u, 1.0)
                } else {
                    0.0
                }
            }
        }
    }

    /// Support radius in bandwidth units.
    #[must_use]
    pub const fn radius(self) -> f64 {
        match self {
            Self::Gaussian => GAUSSIAN_CUTOFF,
            Self::Epanechnikov => 1.0,
        }
    }
}

/// Bandwidth selection rule.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BandwidthRule {
    /// Silverman's rule of thumb
    #[default]
    Silverman,
    /// Scott's rule
    Scott,
    /// Fixed bandwidth
    Fixed {
        /// Bandwidth (> 0)
        value: f64,
    },
}

impl BandwidthRule {
    /// Bandwidth for `sample`.
    #[must_use]
    pub fn bandwidth(self, sample: &EmpiricalDistribution) -> f64 {
        let n = sample.len() as f64;
        let sd = sample.std_dev();
        match self {
            Self::Silverman => {
                let robust = sample.iqr() / 1.34;
                let spread = if robust > 0.0 { sd.min(robust) } else { sd };
                0.9 * spread * n.powf(-0.2)
            }
            Self::Scott => 1.06 * sd * n.powf(-0.2),
            Self::Fixed { value } => value,
        }
    }
}

/// Kernel density estimate over a sorted sample.
#[derive(Debug, Clone)]
pub struct KernelDensity<'a> {
    sample: &'a EmpiricalDistribution,
    kernel: Kernel,
    bandwidth: f64,
}

impl<'a> KernelDensity<'a> {
    /// Fit on `sample`.
    ///
    /// # Errors
    ///
    /// [`EstimationError::NonFinite`] if the rule yields a non-positive or
    /// non-finite bandwidth.
    pub fn new(
        sample: &'a EmpiricalDistribution,
        kernel: Kernel,
        rule: BandwidthRule,
    ) -> Result<Self, EstimationError> {
        let bandwidth = rule.bandwidth(sample);
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(EstimationError::NonFinite("bandwidth"));
        }
        Ok(Self {
            sample,
            kernel,
            bandwidth,
        })
    }

    /// Bandwidth in use.
    #[must_use]
    pub const fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Density estimate at `x`.
    ///
    /// Only observations within the kernel radius are visited.
    #[must_use]
    pub fn density(&self, x: f64) -> f64 {
        let sorted = self.sample.sorted();
        let reach = self.kernel.radius() * self.bandwidth;
        let lo = sorted.partition_point(|&y| y < x - reach);
        let hi = sorted.partition_point(|&y| y <= x + reach);
        let total: f64 = sorted[lo..hi]
            .iter()
            .map(|&y| self.kernel.weight((x - y) / self.bandwidth))
            .sum();
        total / (sorted.len() as f64 * self.bandwidth)
    }
}
