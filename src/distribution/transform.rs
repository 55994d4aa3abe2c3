//! Monotone increasing transforms of a base distribution.
//!
//! CiC effects are identified up to strictly increasing transformations of
//! the outcome, so these are the building blocks for DGPs with a known
//! counterfactual.

use super::{OutcomeDistribution, SharedDistribution};

/// `scale * X + shift` with `scale > 0`.
#[derive(Debug, Clone)]
pub struct Affine {
    base: SharedDistribution,
    scale: f64,
    shift: f64,
}

impl Affine {
    /// Wrap `base`. `scale` must already be validated positive.
    #[must_use]
    pub fn new(base: SharedDistribution, scale: f64, shift: f64) -> Self {
        Self { base, scale, shift }
    }
}

impl OutcomeDistribution for Affine {
    fn cdf(&self, x: f64) -> f64 {
        self.base.cdf((x - self.shift) / self.scale)
    }

    fn quantile(&self, p: f64) -> f64 {
        self.scale.mul_add(self.base.quantile(p), self.shift)
    }

    fn sf(&self, x: f64) -> f64 {
        self.base.sf((x - self.shift) / self.scale)
    }

    fn upper_quantile(&self, q: f64) -> f64 {
        self.scale.mul_add(self.base.upper_quantile(q), self.shift)
    }

    fn mean(&self) -> Option<f64> {
        self.base.mean().map(|m| self.scale.mul_add(m, self.shift))
    }
}

/// `exp(X)`. No closed-form mean in general; callers integrate the quantile.
#[derive(Debug, Clone)]
pub struct ExpTransform {
    base: SharedDistribution,
}

impl ExpTransform {
    /// Wrap `base`.
    #[must_use]
    pub fn new(base: SharedDistribution) -> Self {
        Self { base }
    }
}

impl OutcomeDistribution for ExpTransform {
    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            0.0
        } else {
            self.base.cdf(x.ln())
        }
    }

    fn quantile(&self, p: f64) -> f64 {
        self.base.quantile(p).exp()
    }

    fn sf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            1.0
        } else {
            self.base.sf(x.ln())
        }
    }

    fn upper_quantile(&self, q: f64) -> f64 {
        self.base.upper_quantile(q).exp()
    }
}
