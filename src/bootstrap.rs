//! Bootstrap Engine: nonparametric resampling of a CiC dataset
//!
//! Each resample redraws every group with replacement at its own size and
//! re-runs the point estimator. Resample `b` owns the stream
//! `seed::resample_seed(bootstrap_seed, b)`, so draws are evaluated in
//! parallel but collected in index order.
//!
//! Percentile intervals use linear-interpolation quantiles of the sorted
//! retained draws at `(1 - L)/2` and `1 - (1 - L)/2`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::data::SyntheticDataset;
use crate::estimator::{CicEstimator, ConfidenceInterval};
use crate::seed;
use crate::{Error, Result};

/// How bootstrap draws become an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// Empirical quantiles of the draws
    #[default]
    Percentile,
    /// Point estimate +- z * bootstrap SE
    Normal,
}

/// Bootstrap draws of one replication and the intervals built from them.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResult {
    /// Retained estimates in resample order
    pub draws: Vec<f64>,
    /// Resamples whose estimate failed
    pub discarded: usize,
    /// Resamples requested
    pub requested: usize,
    /// Sample standard deviation of the draws (`n - 1`; 0 for a single draw)
    pub std_error: f64,
    /// One interval per level
    pub intervals: Vec<ConfidenceInterval>,
    /// Method used for `intervals`
    pub method: IntervalMethod,
}

impl BootstrapResult {
    /// Interval at `level`, if it was requested.
    #[must_use]
    pub fn interval(&self, level: f64) -> Option<&ConfidenceInterval> {
        self.intervals.iter().find(|ci| (ci.level - level).abs() < 1e-12)
    }
}

/// Runs `resamples` bootstrap draws of a [`CicEstimator`].
#[derive(Debug, Clone)]
pub struct BootstrapEngine {
    estimator: CicEstimator,
    resamples: usize,
    levels: Vec<f64>,
    method: IntervalMethod,
}

impl BootstrapEngine {
    /// New engine.
    #[must_use]
    pub fn new(
        estimator: CicEstimator,
        resamples: usize,
        levels: Vec<f64>,
        method: IntervalMethod,
    ) -> Self {
        Self {
            estimator,
            resamples,
            levels,
            method,
        }
    }

    /// Resamples per run.
    #[must_use]
    pub const fn resamples(&self) -> usize {
        self.resamples
    }

    /// Bootstrap `data`.
    ///
    /// `point_estimate` centres the normal-method intervals; it is ignored by
    /// the percentile method.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientResamples`] when no resample produced an estimate.
    pub fn run(
        &self,
        data: &SyntheticDataset,
        point_estimate: f64,
        bootstrap_seed: u64,
    ) -> Result<BootstrapResult> {
        let outcomes: Vec<Option<f64>> = (0..self.resamples)
            .into_par_iter()
            .map(|b| {
                let mut rng = seed::stream(seed::resample_seed(bootstrap_seed, b as u64));
                let resample = data.resample(&mut rng);
                match self.estimator.point_estimate(&resample) {
                    Ok(est) => Some(est),
                    Err(e) => {
                        trace!(resample = b, reason = e.label(), "bootstrap draw discarded");
                        None
                    }
                }
            })
            .collect();

        let draws: Vec<f64> = outcomes.into_iter().flatten().collect();
        let discarded = self.resamples - draws.len();
        if draws.is_empty() {
            return Err(Error::InsufficientResamples {
                retained: 0,
                requested: self.resamples,
            });
        }

        let std_error = sample_std_dev(&draws);
        let intervals = match self.method {
            IntervalMethod::Percentile => {
                let mut sorted = draws.clone();
                sorted.sort_unstable_by(f64::total_cmp);
                self.levels
                    .iter()
                    .map(|&level| percentile_interval(&sorted, level))
                    .collect()
            }
            IntervalMethod::Normal => self
                .levels
                .iter()
                .map(|&level| ConfidenceInterval::normal(point_estimate, std_error, level))
                .collect(),
        };

        Ok(BootstrapResult {
            draws,
            discarded,
            requested: self.resamples,
            std_error,
            intervals,
            method: self.method,
        })
    }
}

/// Percentile interval at `level` over sorted draws.
#[must_use]
pub fn percentile_interval(sorted: &[f64], level: f64) -> ConfidenceInterval {
    let alpha = (1.0 - level) / 2.0;
    ConfidenceInterval {
        level,
        lower: quantile_linear_sorted(sorted, alpha),
        upper: quantile_linear_sorted(sorted, 1.0 - alpha),
    }
}

/// Quantile for sorted data via linear interpolation.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `NaN`
#[must_use]
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (n - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_linear_sorted_edges() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile_linear_sorted(&s, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile_linear_sorted(&s, 1.0) - 5.0).abs() < 1e-12);
        assert!((quantile_linear_sorted(&s, 0.5) - 3.0).abs() < 1e-12);
        assert!((quantile_linear_sorted(&s, 0.125) - 1.5).abs() < 1e-12);
        assert!(quantile_linear_sorted(&[], 0.5).is_nan());
        assert_eq!(quantile_linear_sorted(&[7.0], 0.3), 7.0);
    }

    #[test]
    fn percentile_intervals_nest() {
        let sorted: Vec<f64> = (0..200).map(|i| f64::from(i).sqrt()).collect();
        let ci90 = percentile_interval(&sorted, 0.90);
        let ci95 = percentile_interval(&sorted, 0.95);
        assert!(ci95.lower <= ci90.lower);
        assert!(ci90.upper <= ci95.upper);
    }

    #[test]
    fn std_dev_of_single_draw_is_zero() {
        assert_eq!(sample_std_dev(&[3.0]), 0.0);
        assert!((sample_std_dev(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_resamples_are_discarded() {
        // Two-point groups: a resample is degenerate with probability 1/2 per group.
        let data = SyntheticDataset::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![0.5, 1.5],
        );
        let engine = BootstrapEngine::new(
            CicEstimator::default(),
            400,
            vec![0.95],
            IntervalMethod::Percentile,
        );
        let result = engine.run(&data, 0.5, 17).unwrap();
        assert_eq!(result.draws.len() + result.discarded, 400);
        assert!(result.discarded > 0);
        assert!(!result.draws.is_empty());
    }

    #[test]
    fn all_draws_failing_is_an_error() {
        let data = SyntheticDataset::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![5.0, 6.0],
            vec![5.0, 6.0],
        );
        let engine =
            BootstrapEngine::new(CicEstimator::default(), 20, vec![0.9], IntervalMethod::Normal);
        let err = engine.run(&data, 0.0, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientResamples {
                retained: 0,
                requested: 20
            }
        ));
    }
}
