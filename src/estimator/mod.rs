//! Estimator Engine: Change-in-Change point estimate and asymptotic SE
//!
//! The CiC model (Athey & Imbens 2006) identifies the counterfactual
//! distribution of the treated group in the post period by passing each
//! treated-pre outcome through the control group's quantile-quantile map:
//!
//! ```text
//! k(y) = F01^{-1}( F00(y) )
//! tau  = E[Y11] - E[k(Y10)]
//! ```
//!
//! Both expectations are replaced by their empirical counterparts. The
//! standard error comes from the first-order (influence function) expansion
//! in [`variance`], which needs the control-post density at each `k(Y10_j)`;
//! that density is a kernel estimate ([`kde`]).
//!
//! ## Failure policy
//!
//! The engine never extrapolates silently. Degenerate groups, treated-pre
//! samples that leave the control-pre support beyond a tolerance, and
//! vanishing density estimates all return an [`EstimationError`].

pub mod ecdf;
pub mod kde;
mod variance;

pub use ecdf::EmpiricalDistribution;
pub use kde::{BandwidthRule, Kernel, KernelDensity};

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;

use crate::data::{Group, SyntheticDataset};
use crate::error::EstimationError;
use crate::{Error, Result};

/// Default share of treated-pre outcomes allowed outside the control-pre range.
pub const DEFAULT_SUPPORT_TOLERANCE: f64 = 0.05;

/// Tuning of the estimator and its variance.
///
/// `support_tolerance` relaxes the strict rule of rejecting any treated-pre
/// outcome outside the control-pre range. Up to that share of outcomes may
/// lie outside `[min, max]` of control-pre; they get rank 0 or 1 and so map
/// to the smallest or largest control-post outcome, which is the same as
/// clamping them to the control-pre range first. Set it to 0 to fail on any
/// extrapolation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorSettings {
    /// Kernel for the control-post density
    pub kernel: Kernel,
    /// Bandwidth rule for the control-post density
    pub bandwidth: BandwidthRule,
    /// Maximum share of treated-pre outcomes outside `[min, max]` of control-pre
    pub support_tolerance: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            kernel: Kernel::default(),
            bandwidth: BandwidthRule::default(),
            support_tolerance: DEFAULT_SUPPORT_TOLERANCE,
        }
    }
}

impl EstimatorSettings {
    /// Check ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a tolerance outside `[0, 1)` or a
    /// non-positive fixed bandwidth.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.support_tolerance) {
            return Err(Error::Configuration(format!(
                "support_tolerance must be in [0, 1), got {}",
                self.support_tolerance
            )));
        }
        if let BandwidthRule::Fixed { value } = self.bandwidth {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Configuration(format!(
                    "fixed bandwidth must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Two-sided confidence interval at a nominal confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Nominal coverage, e.g. 0.95
    pub level: f64,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Symmetric normal-approximation interval `center +- z * se`.
    #[must_use]
    pub fn normal(center: f64, se: f64, level: f64) -> Self {
        let half = z_critical(level) * se;
        Self {
            level,
            lower: center - half,
            upper: center + half,
        }
    }

    /// Whether `value` lies in the closed interval.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// `upper - lower`.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Two-sided standard normal critical value: `P(|Z| <= z) = level`.
#[must_use]
pub fn z_critical(level: f64) -> f64 {
    std::f64::consts::SQRT_2 * erf_inv(level)
}

/// Output of the estimator on one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    /// CiC point estimate of the treatment effect on the treated
    pub estimate: f64,
    /// Asymptotic standard error (>= 0)
    pub std_error: f64,
    /// Bandwidth of the control-post density estimate
    pub bandwidth: f64,
    /// Normal-approximation intervals, one per requested level
    pub intervals: Vec<ConfidenceInterval>,
}

impl EstimationResult {
    /// Interval at `level`, if it was requested.
    #[must_use]
    pub fn interval(&self, level: f64) -> Option<&ConfidenceInterval> {
        self.intervals.iter().find(|ci| (ci.level - level).abs() < 1e-12)
    }
}

/// Fitted empirical CiC map for one dataset.
#[derive(Debug, Clone)]
pub(crate) struct CicFit {
    pub(crate) control_pre: EmpiricalDistribution,
    pub(crate) control_post: EmpiricalDistribution,
    pub(crate) treated_post: EmpiricalDistribution,
    /// Treated-pre outcomes, sorted
    pub(crate) treated_pre: Vec<f64>,
    /// `u_j = F00(Y10_j)`
    pub(crate) ranks: Vec<f64>,
    /// `k_j = F01^{-1}(u_j)`
    pub(crate) counterfactual: Vec<f64>,
    pub(crate) estimate: f64,
}

/// The CiC estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CicEstimator {
    settings: EstimatorSettings,
}

impl CicEstimator {
    /// Estimator with the given settings.
    #[must_use]
    pub const fn new(settings: EstimatorSettings) -> Self {
        Self { settings }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    /// Point estimate only (no density, no variance). Used by the bootstrap.
    ///
    /// # Errors
    ///
    /// See [`EstimationError`].
    pub fn point_estimate(&self, data: &SyntheticDataset) -> std::result::Result<f64, EstimationError> {
        self.fit(data).map(|fit| fit.estimate)
    }

    /// Point estimate, asymptotic standard error and normal intervals at
    /// each of `levels`.
    ///
    /// # Errors
    ///
    /// See [`EstimationError`].
    pub fn estimate(
        &self,
        data: &SyntheticDataset,
        levels: &[f64],
    ) -> std::result::Result<EstimationResult, EstimationError> {
        let fit = self.fit(data)?;
        let density =
            KernelDensity::new(&fit.control_post, self.settings.kernel, self.settings.bandwidth)?;
        let var = variance::asymptotic_variance(&fit, &density)?;
        let std_error = var.sqrt();
        let intervals = levels
            .iter()
            .map(|&level| ConfidenceInterval::normal(fit.estimate, std_error, level))
            .collect();
        Ok(EstimationResult {
            estimate: fit.estimate,
            std_error,
            bandwidth: density.bandwidth(),
            intervals,
        })
    }

    pub(crate) fn fit(&self, data: &SyntheticDataset) -> std::result::Result<CicFit, EstimationError> {
        let control_pre = EmpiricalDistribution::new(Group::ControlPre, data.group(Group::ControlPre))?;
        let control_post =
            EmpiricalDistribution::new(Group::ControlPost, data.group(Group::ControlPost))?;
        let treated_pre_dist =
            EmpiricalDistribution::new(Group::TreatedPre, data.group(Group::TreatedPre))?;
        let treated_post =
            EmpiricalDistribution::new(Group::TreatedPost, data.group(Group::TreatedPost))?;

        let treated_pre = treated_pre_dist.sorted();
        let (lo, hi) = (control_pre.min(), control_pre.max());
        let outside = treated_pre.partition_point(|&y| y < lo)
            + (treated_pre.len() - treated_pre.partition_point(|&y| y <= hi));
        let tolerance = self.settings.support_tolerance;
        if outside as f64 > tolerance * treated_pre.len() as f64 {
            return Err(EstimationError::OutOfSupport {
                outside,
                total: treated_pre.len(),
                tolerance,
            });
        }

        let ranks: Vec<f64> = treated_pre.iter().map(|&y| control_pre.cdf(y)).collect();
        let counterfactual: Vec<f64> = ranks.iter().map(|&u| control_post.quantile(u)).collect();
        let counterfactual_mean = counterfactual.iter().sum::<f64>() / counterfactual.len() as f64;
        let estimate = treated_post.mean() - counterfactual_mean;
        if !estimate.is_finite() {
            return Err(EstimationError::NonFinite("point estimate"));
        }

        Ok(CicFit {
            treated_pre: treated_pre.to_vec(),
            control_pre,
            control_post,
            treated_post,
            ranks,
            counterfactual,
            estimate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(shift: f64) -> SyntheticDataset {
        let base: Vec<f64> = (0..40).map(|i| f64::from(i) * 0.25).collect();
        let shifted = |s: f64| base.iter().map(|x| x + s).collect::<Vec<_>>();
        SyntheticDataset::new(base.clone(), shifted(1.0), base.clone(), shifted(1.0 + shift))
    }

    #[test]
    fn test_exact_location_shift_recovered() {
        // Identical pre samples: k(y) = y + 1 exactly.
        let est = CicEstimator::default().point_estimate(&dataset(0.75)).unwrap();
        assert!((est - 0.75).abs() < 1e-12, "estimate {est}");
    }

    #[test]
    fn test_estimate_has_ordered_intervals() {
        let result = CicEstimator::default()
            .estimate(&dataset(0.5), &[0.9, 0.95])
            .unwrap();
        assert!(result.std_error > 0.0);
        let ci90 = result.interval(0.9).unwrap();
        let ci95 = result.interval(0.95).unwrap();
        assert!(ci90.lower <= ci90.upper);
        assert!(ci95.lower < ci90.lower && ci90.upper < ci95.upper);
        assert!(ci95.contains(result.estimate));
    }

    #[test]
    fn test_constant_group_is_degenerate() {
        let mut_data = SyntheticDataset::new(
            vec![1.0, 2.0, 3.0],
            vec![2.0; 3],
            vec![1.5, 2.5, 2.0],
            vec![4.0, 5.0, 6.0],
        );
        let err = CicEstimator::default().point_estimate(&mut_data).unwrap_err();
        assert!(matches!(
            err,
            EstimationError::Degenerate {
                group: Group::ControlPost,
                ..
            }
        ));
    }

    #[test]
    fn test_disjoint_support_fails() {
        let data = SyntheticDataset::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0, 3.0],
            vec![10.0, 11.0, 12.0, 13.0],
            vec![10.0, 11.0, 12.0, 13.0],
        );
        let err = CicEstimator::default().point_estimate(&data).unwrap_err();
        assert!(matches!(err, EstimationError::OutOfSupport { outside: 4, total: 4, .. }));
    }

    #[test]
    fn test_small_overhang_within_tolerance() {
        let mut pre: Vec<f64> = (0..100).map(f64::from).collect();
        let control_pre = pre.clone();
        pre[99] = 150.0; // 1 of 100 outside
        let data = SyntheticDataset::new(control_pre.clone(), control_pre.clone(), pre, control_pre);
        assert!(CicEstimator::default().point_estimate(&data).is_ok());

        let strict = CicEstimator::new(EstimatorSettings {
            support_tolerance: 0.0,
            ..EstimatorSettings::default()
        });
        let mut pre: Vec<f64> = (0..100).map(f64::from).collect();
        pre[0] = -1.0;
        let control: Vec<f64> = (0..100).map(f64::from).collect();
        let data = SyntheticDataset::new(control.clone(), control.clone(), pre, control);
        assert!(strict.point_estimate(&data).is_err());
    }

    #[test]
    fn test_overhang_clamped_to_control_pre_range() {
        let control_pre: Vec<f64> = (0..100).map(f64::from).collect();
        let control_post: Vec<f64> = control_pre.iter().map(|x| 10.0 * x).collect();
        let treated_post = control_pre.clone();
        let estimate = |treated_pre: Vec<f64>| {
            let data = SyntheticDataset::new(
                control_pre.clone(),
                control_post.clone(),
                treated_pre,
                treated_post.clone(),
            );
            CicEstimator::default().point_estimate(&data).unwrap()
        };

        let mut overhang = control_pre.clone();
        overhang[0] = -5.0;
        overhang[99] = 150.0;
        let mut clamped = control_pre.clone();
        clamped[0] = 0.0;
        clamped[99] = 99.0;
        assert_eq!(estimate(overhang), estimate(clamped));
    }

    #[test]
    fn test_z_critical_values() {
        assert!((z_critical(0.95) - 1.959_964).abs() < 1e-5);
        assert!((z_critical(0.90) - 1.644_854).abs() < 1e-5);
    }

    #[test]
    fn test_settings_validation() {
        assert!(EstimatorSettings::default().validate().is_ok());
        let bad = EstimatorSettings {
            support_tolerance: 1.5,
            ..EstimatorSettings::default()
        };
        assert!(bad.validate().is_err());
        let bad = EstimatorSettings {
            bandwidth: BandwidthRule::Fixed { value: -1.0 },
            ..EstimatorSettings::default()
        };
        assert!(bad.validate().is_err());
    }
}
