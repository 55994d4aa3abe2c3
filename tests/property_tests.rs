//! Property-based tests for cic-sim
//!
//! - Test estimator invariants (shift equivariance, order invariance)
//! - Test interval and quantile properties
//! - Test seed determinism
//! - Run with ProptestConfig::with_cases(100)

use cic_sim::bootstrap::{percentile_interval, quantile_linear_sorted, BootstrapEngine};
use cic_sim::data::{self, Group, SyntheticDataset};
use cic_sim::distribution::DistributionSpec;
use cic_sim::estimator::{CicEstimator, EmpiricalDistribution};
use cic_sim::experiment::{GroupDistributions, GroupSizes};
use cic_sim::IntervalMethod;
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Generate one group's outcomes
fn arb_sample(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-10.0f64..10.0, 4..max_len)
}

/// Generate a dataset whose treated-pre sample lies inside control-pre
fn arb_dataset() -> impl Strategy<Value = SyntheticDataset> {
    (arb_sample(40), arb_sample(40), arb_sample(40), arb_sample(40)).prop_map(
        |(control_pre, control_post, treated_pre, treated_post)| {
            let lo = control_pre.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = control_pre.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let treated_pre = treated_pre.iter().map(|y| y.clamp(lo, hi)).collect();
            SyntheticDataset::new(control_pre, control_post, treated_pre, treated_post)
        },
    )
}

/// Number of distinct values in `sample`
fn distinct(sample: &[f64]) -> usize {
    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Generate a sorted, non-empty sample
fn arb_sorted(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-100.0f64..100.0, 1..max_len).prop_map(|mut v| {
        v.sort_by(f64::total_cmp);
        v
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Estimator Properties
    // ========================================================================

    /// Property: shifting treated-post outcomes shifts the estimate by the same amount
    #[test]
    fn prop_estimate_shift_equivariant(data in arb_dataset(), shift in -5.0f64..5.0) {
        let estimator = CicEstimator::default();
        let shifted = SyntheticDataset::new(
            data.group(Group::ControlPre).to_vec(),
            data.group(Group::ControlPost).to_vec(),
            data.group(Group::TreatedPre).to_vec(),
            data.group(Group::TreatedPost).iter().map(|y| y + shift).collect(),
        );
        match (estimator.point_estimate(&data), estimator.point_estimate(&shifted)) {
            (Ok(a), Ok(b)) => prop_assert!((b - a - shift).abs() < 1e-9),
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            _ => prop_assert!(false, "shift changed estimability"),
        }
    }

    /// Property: the estimate does not depend on the order of observations
    #[test]
    fn prop_estimate_order_invariant(data in arb_dataset()) {
        let reversed = |g: Group| data.group(g).iter().rev().copied().collect::<Vec<_>>();
        let flipped = SyntheticDataset::new(
            reversed(Group::ControlPre),
            reversed(Group::ControlPost),
            reversed(Group::TreatedPre),
            reversed(Group::TreatedPost),
        );
        let estimator = CicEstimator::default();
        prop_assert_eq!(estimator.point_estimate(&data), estimator.point_estimate(&flipped));
    }

    /// Property: every dataset with two distinct values per group is estimable,
    /// with a finite estimate, non-negative standard error and ordered, nested intervals
    #[test]
    fn prop_intervals_ordered_and_nested(data in arb_dataset()) {
        // Clamping into the control-pre range can collapse treated-pre.
        prop_assume!(Group::ALL.iter().all(|&g| distinct(data.group(g)) >= 2));
        let result = CicEstimator::default().estimate(&data, &[0.8, 0.9, 0.95]);
        prop_assert!(result.is_ok(), "{:?}", result);
        let result = result.unwrap();
        prop_assert!(result.estimate.is_finite());
        prop_assert!(result.std_error >= 0.0);
        for ci in &result.intervals {
            prop_assert!(ci.lower <= ci.upper);
            prop_assert!(ci.contains(result.estimate));
        }
        for pair in result.intervals.windows(2) {
            prop_assert!(pair[1].lower <= pair[0].lower);
            prop_assert!(pair[0].upper <= pair[1].upper);
        }
    }

    /// Property: empirical quantile inverts the empirical CDF on sample points
    #[test]
    fn prop_quantile_inverts_cdf(sample in arb_sample(60)) {
        if let Ok(ecdf) = EmpiricalDistribution::new(Group::ControlPost, &sample) {
            for &y in &sample {
                prop_assert_eq!(ecdf.quantile(ecdf.cdf(y)), y);
            }
        }
    }

    // ========================================================================
    // Bootstrap Properties
    // ========================================================================

    /// Property: linear quantile is monotone and stays within the sample range
    #[test]
    fn prop_linear_quantile_monotone(sorted in arb_sorted(50), q1 in 0.0f64..1.0, q2 in 0.0f64..1.0) {
        let (lo, hi) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
        let a = quantile_linear_sorted(&sorted, lo);
        let b = quantile_linear_sorted(&sorted, hi);
        prop_assert!(a <= b + 1e-9);
        prop_assert!(sorted[0] - 1e-9 <= a && b <= sorted[sorted.len() - 1] + 1e-9);
    }

    /// Property: percentile intervals widen with the level
    #[test]
    fn prop_percentile_intervals_nest(sorted in arb_sorted(50), l1 in 0.5f64..0.99, l2 in 0.5f64..0.99) {
        let (small, large) = if l1 <= l2 { (l1, l2) } else { (l2, l1) };
        let inner = percentile_interval(&sorted, small);
        let outer = percentile_interval(&sorted, large);
        prop_assert!(outer.lower <= inner.lower + 1e-9);
        prop_assert!(inner.upper <= outer.upper + 1e-9);
    }

    /// Property: every resample is either retained or counted as discarded
    #[test]
    fn prop_bootstrap_accounts_for_every_resample(data in arb_dataset(), seed in any::<u64>()) {
        let engine = BootstrapEngine::new(CicEstimator::default(), 25, vec![0.9], IntervalMethod::Percentile);
        if let Ok(result) = engine.run(&data, 0.0, seed) {
            prop_assert_eq!(result.draws.len() + result.discarded, 25);
            prop_assert!(result.std_error >= 0.0);
        }
    }

    // ========================================================================
    // Determinism Properties
    // ========================================================================

    /// Property: data generation is a pure function of the seed
    #[test]
    fn prop_generate_deterministic(seed in any::<u64>(), n in 2usize..50) {
        let dists = GroupDistributions::location_shift(DistributionSpec::normal(0.0, 1.0), 0.5, 0.25, 1.0)
            .build()
            .unwrap();
        let sizes = GroupSizes::uniform(n);
        prop_assert_eq!(
            data::generate(&sizes, &dists, seed),
            data::generate(&sizes, &dists, seed)
        );
    }
}
