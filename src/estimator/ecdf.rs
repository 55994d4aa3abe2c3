//! Empirical distribution functions on a sorted sample.
//!
//! Conventions follow Athey & Imbens (2006):
//!
//! ```text
//! F(y)      = #{Y_i <= y} / n
//! F^{-1}(q) = Y_(ceil(n q))      q in (0, 1]
//! F^{-1}(0) = Y_(1)
//! ```

use crate::data::Group;
use crate::error::EstimationError;

const RANK_EPS: f64 = 1e-9;

/// Sorted copy of one group's sample.
#[derive(Debug, Clone)]
pub struct EmpiricalDistribution {
    sorted: Vec<f64>,
}

impl EmpiricalDistribution {
    /// Sort `sample` and require at least two distinct values.
    ///
    /// # Errors
    ///
    /// [`EstimationError::Degenerate`] for fewer than two distinct values,
    /// [`EstimationError::NonFinite`] if the sample contains NaN or infinities.
    pub fn new(group: Group, sample: &[f64]) -> Result<Self, EstimationError> {
        if sample.iter().any(|x| !x.is_finite()) {
            return Err(EstimationError::NonFinite("outcome"));
        }
        let mut sorted = sample.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        let distinct = count_distinct(&sorted);
        if distinct < 2 {
            return Err(EstimationError::Degenerate { group, distinct });
        }
        Ok(Self { sorted })
    }

    /// Sample size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// Always false: construction requires two distinct values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Sorted outcomes.
    #[must_use]
    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }

    /// Smallest outcome.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.sorted[0]
    }

    /// Largest outcome.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.sorted[self.sorted.len() - 1]
    }

    /// Empirical CDF at `y`.
    #[must_use]
    pub fn cdf(&self, y: f64) -> f64 {
        let below = self.sorted.partition_point(|&x| x <= y);
        below as f64 / self.sorted.len() as f64
    }

    /// Empirical quantile (left-continuous inverse of [`Self::cdf`]).
    #[must_use]
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.sorted.len();
        let x = q.clamp(0.0, 1.0) * n as f64;
        // q = k/n from a CDF of another sample may land a hair above k.
        let nearest = x.round();
        let rank = if (x - nearest).abs() < RANK_EPS {
            nearest as usize
        } else {
            x.ceil() as usize
        };
        self.sorted[rank.clamp(1, n) - 1]
    }

    /// Sample mean.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
    }

    /// Sample standard deviation (n - 1 denominator).
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        let mean = self.mean();
        let ss: f64 = self.sorted.iter().map(|x| (x - mean) * (x - mean)).sum();
        (ss / (self.sorted.len() - 1) as f64).sqrt()
    }

    /// Interquartile range from the empirical quantiles.
    #[must_use]
    pub fn iqr(&self) -> f64 {
        self.quantile(0.75) - self.quantile(0.25)
    }
}

fn count_distinct(sorted: &[f64]) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    1 + sorted.windows(2).filter(|w| w[0] != w[1]).count()
}
