//! Aggregator: trial outcomes -> summary statistics
//!
//! Accumulation is sum/count based: a Welford mean and second moment for the
//! estimates, plain sums for errors and standard errors, hit counters per
//! confidence level. Two aggregators over disjoint replications merge with
//! Chan's parallel update, so partial results commute.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bootstrap::quantile_linear_sorted;
use crate::experiment::ExperimentSpec;
use crate::runner::{FailureKind, TrialFailure, TrialOutcome};
use crate::{Error, Result};

/// Quantile of the scaled error `sqrt(n) * (estimate - truth)` reported.
pub const SCALED_ERROR_QUANTILE: f64 = 0.95;

/// Equal-width bins of the scaled-error histogram.
pub const HISTOGRAM_BINS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LevelCounts {
    asymptotic_hits: usize,
    bootstrap_hits: usize,
    asymptotic_width: f64,
    bootstrap_width: f64,
}

/// Streaming accumulator for one experiment.
#[derive(Debug, Clone)]
pub struct Aggregator {
    levels: Vec<f64>,
    true_effect: f64,
    root_n: f64,
    successful: usize,
    mean: f64,
    m2: f64,
    sum_sq_error: f64,
    sum_abs_error: f64,
    sum_asymptotic_se: f64,
    sum_bootstrap_se: f64,
    coverage: Vec<LevelCounts>,
    failures: BTreeMap<FailureKind, usize>,
    discarded_draws: usize,
    scaled_errors: Vec<f64>,
}

impl Aggregator {
    /// Empty accumulator.
    ///
    /// `n` is the sample size used to scale errors (smallest group size).
    #[must_use]
    pub fn new(levels: Vec<f64>, true_effect: f64, n: usize) -> Self {
        let coverage = vec![LevelCounts::default(); levels.len()];
        Self {
            levels,
            true_effect,
            root_n: (n as f64).sqrt(),
            successful: 0,
            mean: 0.0,
            m2: 0.0,
            sum_sq_error: 0.0,
            sum_abs_error: 0.0,
            sum_asymptotic_se: 0.0,
            sum_bootstrap_se: 0.0,
            coverage,
            failures: BTreeMap::new(),
            discarded_draws: 0,
            scaled_errors: Vec::new(),
        }
    }

    /// Successful trials so far.
    #[must_use]
    pub const fn successful(&self) -> usize {
        self.successful
    }

    /// Failed trials so far.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.values().sum()
    }

    /// Add one successful trial.
    pub fn push(&mut self, outcome: &TrialOutcome) {
        let estimate = outcome.estimation.estimate;
        let error = estimate - self.true_effect;

        self.successful += 1;
        let delta = estimate - self.mean;
        self.mean += delta / self.successful as f64;
        self.m2 += delta * (estimate - self.mean);

        self.sum_sq_error += error * error;
        self.sum_abs_error += error.abs();
        self.sum_asymptotic_se += outcome.estimation.std_error;
        self.sum_bootstrap_se += outcome.bootstrap.std_error;
        self.discarded_draws += outcome.bootstrap.discarded;
        self.scaled_errors.push(self.root_n * error);

        for (counts, &level) in self.coverage.iter_mut().zip(&self.levels) {
            if let Some(ci) = outcome.estimation.interval(level) {
                counts.asymptotic_hits += usize::from(ci.contains(self.true_effect));
                counts.asymptotic_width += ci.width();
            }
            if let Some(ci) = outcome.bootstrap.interval(level) {
                counts.bootstrap_hits += usize::from(ci.contains(self.true_effect));
                counts.bootstrap_width += ci.width();
            }
        }
    }

    /// Count one failed trial.
    pub fn record_failure(&mut self, failure: &TrialFailure) {
        *self.failures.entry(failure.kind).or_insert(0) += 1;
    }

    /// Fold `other` (disjoint replications) into `self`.
    pub fn merge(&mut self, other: &Self) {
        let (na, nb) = (self.successful as f64, other.successful as f64);
        let n = na + nb;
        if nb > 0.0 {
            let delta = other.mean - self.mean;
            self.mean += delta * nb / n;
            self.m2 += other.m2 + delta * delta * na * nb / n;
        }
        self.successful += other.successful;
        self.sum_sq_error += other.sum_sq_error;
        self.sum_abs_error += other.sum_abs_error;
        self.sum_asymptotic_se += other.sum_asymptotic_se;
        self.sum_bootstrap_se += other.sum_bootstrap_se;
        self.discarded_draws += other.discarded_draws;
        self.scaled_errors.extend_from_slice(&other.scaled_errors);
        for (mine, theirs) in self.coverage.iter_mut().zip(&other.coverage) {
            mine.asymptotic_hits += theirs.asymptotic_hits;
            mine.bootstrap_hits += theirs.bootstrap_hits;
            mine.asymptotic_width += theirs.asymptotic_width;
            mine.bootstrap_width += theirs.bootstrap_width;
        }
        for (kind, count) in &other.failures {
            *self.failures.entry(*kind).or_insert(0) += count;
        }
    }

    /// Final statistics for `spec`.
    ///
    /// # Errors
    ///
    /// [`Error::InsufficientTrials`] when fewer than
    /// `spec.required_successes()` trials succeeded.
    pub fn finish(mut self, spec: &ExperimentSpec) -> Result<SummaryRecord> {
        let requested = spec.replications();
        let required = spec.required_successes();
        if self.successful < required {
            return Err(Error::InsufficientTrials {
                successful: self.successful,
                required,
                requested,
            });
        }

        let n = self.successful as f64;
        let variance = if self.successful > 1 {
            self.m2 / (n - 1.0)
        } else {
            0.0
        };
        self.scaled_errors.sort_unstable_by(f64::total_cmp);
        let scaled_error_histogram = Histogram::from_sorted(&self.scaled_errors, HISTOGRAM_BINS);
        let coverage = self
            .levels
            .iter()
            .zip(&self.coverage)
            .map(|(&level, counts)| CoverageEntry {
                level,
                asymptotic: counts.asymptotic_hits as f64 / n,
                bootstrap: counts.bootstrap_hits as f64 / n,
                asymptotic_mean_width: counts.asymptotic_width / n,
                bootstrap_mean_width: counts.bootstrap_width / n,
            })
            .collect();

        Ok(SummaryRecord {
            spec: spec.clone(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            true_effect: self.true_effect,
            requested,
            successful: self.successful,
            failed: self.failures.values().sum(),
            failures: self.failures,
            discarded_draws: self.discarded_draws,
            mean_estimate: self.mean,
            bias: self.mean - self.true_effect,
            variance,
            rmse: (self.sum_sq_error / n).sqrt(),
            mae: self.sum_abs_error / n,
            mean_asymptotic_se: self.sum_asymptotic_se / n,
            mean_bootstrap_se: self.sum_bootstrap_se / n,
            scaled_error_q95: quantile_linear_sorted(&self.scaled_errors, SCALED_ERROR_QUANTILE),
            scaled_error_histogram,
            coverage,
        })
    }
}

/// Equal-width histogram over the range of its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<usize>,
}

impl Histogram {
    /// Bin ascending `sorted` values into `bins` equal-width bins spanning
    /// `[min, max]`; the last bin is closed. A zero-width range is widened
    /// to `[x - 0.5, x + 0.5]`. Empty input gives an empty histogram.
    #[must_use]
    pub fn from_sorted(sorted: &[f64], bins: usize) -> Self {
        let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
            return Self {
                edges: Vec::new(),
                counts: Vec::new(),
            };
        };
        let bins = bins.max(1);
        let (low, high) = if last > first {
            (first, last)
        } else {
            (first - 0.5, last + 0.5)
        };
        let width = (high - low) / bins as f64;
        let edges = (0..=bins)
            .map(|i| if i == bins { high } else { (i as f64).mul_add(width, low) })
            .collect();
        let mut counts = vec![0; bins];
        for &x in sorted {
            let bin = (((x - low) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Self { edges, counts }
    }

    /// Get the bin edges (`bins + 1` values).
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Get the bin counts.
    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Total binned observations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Iterate `(lower edge, upper edge, count)`.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, usize)> + '_ {
        self.edges
            .windows(2)
            .zip(&self.counts)
            .map(|(edge, &count)| (edge[0], edge[1], count))
    }

    /// Count of bin `i` divided by total count and bin width, so the
    /// densities integrate to 1.
    #[must_use]
    pub fn density(&self, i: usize) -> f64 {
        let width = self.edges[i + 1] - self.edges[i];
        self.counts[i] as f64 / (self.total() as f64 * width)
    }
}

/// Empirical coverage and mean width of both interval types at one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageEntry {
    /// Nominal level
    pub level: f64,
    /// Share of asymptotic intervals containing the true effect
    pub asymptotic: f64,
    /// Share of bootstrap intervals containing the true effect
    pub bootstrap: f64,
    /// Mean asymptotic interval width
    pub asymptotic_mean_width: f64,
    /// Mean bootstrap interval width
    pub bootstrap_mean_width: f64,
}

/// Summary Record - aggregate statistics of one experiment.
///
/// Immutable once built and self-describing: it carries the full
/// [`ExperimentSpec`] that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRecord {
    spec: ExperimentSpec,
    crate_version: String,
    created_at: DateTime<Utc>,
    true_effect: f64,
    requested: usize,
    successful: usize,
    failed: usize,
    failures: BTreeMap<FailureKind, usize>,
    discarded_draws: usize,
    mean_estimate: f64,
    bias: f64,
    variance: f64,
    rmse: f64,
    mae: f64,
    mean_asymptotic_se: f64,
    mean_bootstrap_se: f64,
    scaled_error_q95: f64,
    scaled_error_histogram: Histogram,
    coverage: Vec<CoverageEntry>,
}

impl SummaryRecord {
    /// Get the originating experiment.
    #[must_use]
    pub const fn spec(&self) -> &ExperimentSpec {
        &self.spec
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Get the sample size (smallest group size).
    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.spec.sizes().min()
    }

    /// Get the version of the crate that produced the record.
    #[must_use]
    pub fn crate_version(&self) -> &str {
        &self.crate_version
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the population effect.
    #[must_use]
    pub const fn true_effect(&self) -> f64 {
        self.true_effect
    }

    /// Get the number of replications requested.
    #[must_use]
    pub const fn requested(&self) -> usize {
        self.requested
    }

    /// Get the number of successful replications.
    #[must_use]
    pub const fn successful(&self) -> usize {
        self.successful
    }

    /// Get the number of failed (excluded) replications.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Get failed replications by kind.
    #[must_use]
    pub const fn failures(&self) -> &BTreeMap<FailureKind, usize> {
        &self.failures
    }

    /// Get the bootstrap draws discarded across successful replications.
    #[must_use]
    pub const fn discarded_draws(&self) -> usize {
        self.discarded_draws
    }

    /// Get the mean point estimate.
    #[must_use]
    pub const fn mean_estimate(&self) -> f64 {
        self.mean_estimate
    }

    /// Get the bias (mean estimate - true effect).
    #[must_use]
    pub const fn bias(&self) -> f64 {
        self.bias
    }

    /// Get the variance of the point estimates (`n - 1` denominator).
    #[must_use]
    pub const fn variance(&self) -> f64 {
        self.variance
    }

    /// Get the root mean squared error.
    #[must_use]
    pub const fn rmse(&self) -> f64 {
        self.rmse
    }

    /// Get the mean absolute error.
    #[must_use]
    pub const fn mae(&self) -> f64 {
        self.mae
    }

    /// Get the mean asymptotic standard error.
    #[must_use]
    pub const fn mean_asymptotic_se(&self) -> f64 {
        self.mean_asymptotic_se
    }

    /// Get the mean bootstrap standard error.
    #[must_use]
    pub const fn mean_bootstrap_se(&self) -> f64 {
        self.mean_bootstrap_se
    }

    /// Get the 0.95 quantile of `sqrt(n) * (estimate - truth)`.
    #[must_use]
    pub const fn scaled_error_q95(&self) -> f64 {
        self.scaled_error_q95
    }

    /// Get the histogram of `sqrt(n) * (estimate - truth)`.
    #[must_use]
    pub const fn scaled_error_histogram(&self) -> &Histogram {
        &self.scaled_error_histogram
    }

    /// Get the standard deviation of the normal law the scaled errors
    /// should follow: `sqrt(n)` times the mean asymptotic standard error.
    #[must_use]
    pub fn scaled_error_normal_sd(&self) -> f64 {
        (self.sample_size() as f64).sqrt() * self.mean_asymptotic_se
    }

    /// Get the coverage entries, one per level.
    #[must_use]
    pub fn coverage(&self) -> &[CoverageEntry] {
        &self.coverage
    }

    /// Get the coverage entry at `level`, if that level was run.
    #[must_use]
    pub fn coverage_at(&self, level: f64) -> Option<&CoverageEntry> {
        self.coverage.iter().find(|c| (c.level - level).abs() < 1e-12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{BootstrapResult, IntervalMethod};
    use crate::data::SyntheticDataset;
    use crate::distribution::DistributionSpec;
    use crate::estimator::{CicEstimator, ConfidenceInterval, EstimationResult};
    use crate::experiment::{GroupDistributions, GroupSizes};

    fn spec(replications: usize, min_success_fraction: f64) -> ExperimentSpec {
        ExperimentSpec::builder(
            "agg",
            GroupSizes::uniform(100),
            GroupDistributions::location_shift(DistributionSpec::normal(0.0, 1.0), 0.0, 0.0, 1.0),
        )
        .replications(replications)
        .confidence_levels(vec![0.95])
        .min_success_fraction(min_success_fraction)
        .build()
        .unwrap()
    }

    fn outcome(index: usize, estimate: f64, half_width: f64) -> TrialOutcome {
        let ci = ConfidenceInterval {
            level: 0.95,
            lower: estimate - half_width,
            upper: estimate + half_width,
        };
        TrialOutcome {
            index,
            seed: index as u64,
            true_effect: 1.0,
            estimation: EstimationResult {
                estimate,
                std_error: half_width / 2.0,
                bandwidth: 0.1,
                intervals: vec![ci],
            },
            bootstrap: BootstrapResult {
                draws: vec![estimate],
                discarded: 1,
                requested: 2,
                std_error: half_width / 2.0,
                intervals: vec![ci],
                method: IntervalMethod::Percentile,
            },
        }
    }

    fn failure(index: usize) -> TrialFailure {
        TrialFailure {
            index,
            seed: index as u64,
            kind: FailureKind::OutOfSupport,
            reason: "test".into(),
        }
    }

    #[test]
    fn test_statistics() {
        let mut agg = Aggregator::new(vec![0.95], 1.0, 100);
        agg.push(&outcome(0, 0.8, 0.5)); // covers
        agg.push(&outcome(1, 1.4, 0.3)); // misses
        agg.push(&outcome(2, 1.1, 0.2)); // covers
        agg.record_failure(&failure(3));

        let summary = agg.finish(&spec(4, 0.5)).unwrap();
        assert_eq!(summary.successful(), 3);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures()[&FailureKind::OutOfSupport], 1);
        assert_eq!(summary.discarded_draws(), 3);
        assert!((summary.mean_estimate() - 1.1).abs() < 1e-12);
        assert!((summary.bias() - 0.1).abs() < 1e-12);
        assert!((summary.variance() - 0.09).abs() < 1e-12);
        let mse = (0.04 + 0.16 + 0.01) / 3.0;
        assert!((summary.rmse() - f64::sqrt(mse)).abs() < 1e-12);
        assert!((summary.mae() - 0.7 / 3.0).abs() < 1e-12);
        let cov = summary.coverage_at(0.95).unwrap();
        assert!((cov.asymptotic - 2.0 / 3.0).abs() < 1e-12);
        assert!((cov.bootstrap_mean_width - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_dataset_failure_excluded() {
        // Constant control-post sample: the estimator rejects it.
        let data = SyntheticDataset::new(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![2.0; 4],
            vec![1.5, 2.5, 3.5, 2.0],
            vec![4.0, 5.0, 6.0, 7.0],
        );
        let err = CicEstimator::default().estimate(&data, &[0.95]).unwrap_err();
        let degenerate = TrialFailure::estimation(1, 99, &err);
        assert_eq!(degenerate.kind, FailureKind::Degenerate);
        assert_eq!(degenerate.seed, 99);

        let mut with_failure = Aggregator::new(vec![0.95], 1.0, 100);
        let mut clean = Aggregator::new(vec![0.95], 1.0, 100);
        for (i, estimate) in [(0, 0.9), (2, 1.2), (3, 1.05)] {
            with_failure.push(&outcome(i, estimate, 0.3));
            clean.push(&outcome(i, estimate, 0.3));
        }
        with_failure.record_failure(&degenerate);
        assert_eq!(with_failure.failed(), 1);

        let summary = with_failure.finish(&spec(4, 0.5)).unwrap();
        let reference = clean.finish(&spec(4, 0.5)).unwrap();
        assert_eq!(summary.failures()[&FailureKind::Degenerate], 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.successful(), 3);
        assert_eq!(summary.mean_estimate(), reference.mean_estimate());
        assert_eq!(summary.variance(), reference.variance());
        assert_eq!(summary.rmse(), reference.rmse());
        assert_eq!(summary.mae(), reference.mae());
        assert_eq!(summary.coverage(), reference.coverage());
        assert_eq!(summary.scaled_error_histogram(), reference.scaled_error_histogram());
    }

    #[test]
    fn test_histogram_bins() {
        let values = [-1.0, -0.5, 0.0, 0.2, 0.9, 1.0];
        let hist = Histogram::from_sorted(&values, 4);
        assert_eq!(hist.edges(), &[-1.0, -0.5, 0.0, 0.5, 1.0]);
        // Interior edges open the next bin; the last bin is closed.
        assert_eq!(hist.counts(), &[1, 1, 2, 2]);
        assert_eq!(hist.total(), 6);
        let area: f64 = (0..4).map(|i| hist.density(i) * 0.5).sum();
        assert!((area - 1.0).abs() < 1e-12);
        let (lower, upper, count) = hist.bins().nth(2).unwrap();
        assert_eq!((lower, upper, count), (0.0, 0.5, 2));

        let single = Histogram::from_sorted(&[3.0, 3.0], 5);
        assert_eq!(single.edges().first(), Some(&2.5));
        assert_eq!(single.edges().last(), Some(&3.5));
        assert_eq!(single.counts(), &[0, 0, 2, 0, 0]);

        assert_eq!(Histogram::from_sorted(&[], 10).total(), 0);
    }

    #[test]
    fn test_summary_histogram_of_scaled_errors() {
        let mut agg = Aggregator::new(vec![0.95], 1.0, 100);
        for i in 0..40 {
            agg.push(&outcome(i, 1.0 + (i as f64 * 0.37).sin() / 10.0, 0.2));
        }
        let summary = agg.finish(&spec(40, 0.9)).unwrap();
        let hist = summary.scaled_error_histogram();
        assert_eq!(hist.counts().len(), HISTOGRAM_BINS);
        assert_eq!(hist.total(), 40);
        // Errors of at most 0.1 scale by sqrt(100) = 10.
        assert!(hist.edges()[0] >= -1.0 - 1e-12);
        assert!(hist.edges()[HISTOGRAM_BINS] <= 1.0 + 1e-12);
        assert!((summary.scaled_error_normal_sd() - 10.0 * 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_trials() {
        let mut agg = Aggregator::new(vec![0.95], 1.0, 100);
        agg.push(&outcome(0, 1.0, 0.1));
        for i in 1..10 {
            agg.record_failure(&failure(i));
        }
        let err = agg.finish(&spec(10, 0.9)).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientTrials {
                successful: 1,
                required: 9,
                requested: 10
            }
        ));
    }

    #[test]
    fn test_merge_matches_sequential() {
        let outcomes: Vec<_> = (0..20)
            .map(|i| outcome(i, 1.0 + (i as f64 * 0.37).sin(), 0.4))
            .collect();

        let mut sequential = Aggregator::new(vec![0.95], 1.0, 100);
        outcomes.iter().for_each(|o| sequential.push(o));

        let mut left = Aggregator::new(vec![0.95], 1.0, 100);
        let mut right = Aggregator::new(vec![0.95], 1.0, 100);
        outcomes[..7].iter().for_each(|o| left.push(o));
        outcomes[7..].iter().for_each(|o| right.push(o));
        left.merge(&right);

        let a = sequential.finish(&spec(20, 0.9)).unwrap();
        let b = left.finish(&spec(20, 0.9)).unwrap();
        assert!((a.mean_estimate() - b.mean_estimate()).abs() < 1e-12);
        assert!((a.variance() - b.variance()).abs() < 1e-12);
        assert!((a.rmse() - b.rmse()).abs() < 1e-12);
        for (x, y) in a.coverage().iter().zip(b.coverage()) {
            assert_eq!(x.asymptotic, y.asymptotic);
            assert!((x.asymptotic_mean_width - y.asymptotic_mean_width).abs() < 1e-12);
        }
        assert_eq!(a.scaled_error_q95(), b.scaled_error_q95());
    }
}
