//! Population CiC effect of a data-generating process.
//!
//! ```text
//! tau = E[Y11] - E[ F01^{-1}( F00(Y10) ) ]
//! ```
//!
//! Means come from closed forms where a family provides one. Otherwise the
//! expectation is written on the probability scale, `E[g(Y)] = int_0^1
//! g(F^{-1}(p)) dp`, split at `p = 1/2` and integrated towards each end in
//! log coordinates `u = e^{-s}`, where `u` is `p` near 0 and `1 - p` near 1.
//! The upper half is evaluated through survival and upper-quantile functions
//! so `1 - p` is never rounded. Past `u = 2^-100` the integrand is treated as
//! a power law `C u^-a`, with `a` estimated from two points; that remainder is
//! added analytically, and `a` close to 1 means the expectation diverges.

use std::f64::consts::LN_2;

use tracing::debug;

use crate::data::Group;
use crate::distribution::{DistributionSet, OutcomeDistribution};
use crate::{Error, Result};

/// Simpson intervals per half of the unit interval (even).
pub const QUADRATURE_INTERVALS: usize = 1 << 14;

/// Integration in `u` stops at `2^-TAIL_DEPTH`.
const TAIL_DEPTH: i32 = 100;

/// Octaves between the two points of the tail-exponent estimate.
const EXPONENT_SPAN: i32 = 20;

/// Integrands growing like `u^-a` with `a` at or above this are rejected.
pub const MAX_TAIL_EXPONENT: f64 = 0.99;

/// Largest probability strictly below 1.
const ONE_MINUS: f64 = 1.0 - f64::EPSILON / 2.0;

/// `int_0^1 g(p) dp`, given `g` near each end of the unit interval.
///
/// `lower(u)` is `g(u)` and `upper(u)` is `g(1 - u)`, both for `u` in
/// `(0, 1/2]`. `what` names the quantity in error messages.
///
/// # Errors
///
/// [`Error::Configuration`] when the integrand grows at least like
/// `u^-MAX_TAIL_EXPONENT` at either end, or the result is not finite.
pub fn integrate_probability<L, U>(what: &str, lower: L, upper: U) -> Result<f64>
where
    L: Fn(f64) -> f64,
    U: Fn(f64) -> f64,
{
    let value = half_integral(what, "p -> 0", &lower)? + half_integral(what, "p -> 1", &upper)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::Configuration(format!("{what} is not finite ({value})")))
    }
}

/// `int_0^{1/2} f(u) du`: Simpson's rule in `s = -ln u` plus the power-law
/// remainder below `2^-TAIL_DEPTH`.
fn half_integral<F: Fn(f64) -> f64>(what: &str, end: &str, f: &F) -> Result<f64> {
    let start = LN_2;
    let stop = f64::from(TAIL_DEPTH) * LN_2;
    let h = (stop - start) / QUADRATURE_INTERVALS as f64;
    let body = (0..=QUADRATURE_INTERVALS)
        .map(|i| {
            let weight = if i == 0 || i == QUADRATURE_INTERVALS {
                1.0
            } else if i % 2 == 1 {
                4.0
            } else {
                2.0
            };
            let u = (-(i as f64).mul_add(h, start)).exp();
            weight * f(u) * u
        })
        .sum::<f64>()
        * h
        / 3.0;

    let cutoff = 2f64.powi(-TAIL_DEPTH);
    let edge = f(cutoff);
    let exponent = tail_exponent(edge, f(cutoff * 2f64.powi(EXPONENT_SPAN)));
    if exponent >= MAX_TAIL_EXPONENT {
        return Err(Error::Configuration(format!(
            "{what} diverges: integrand grows like u^-{exponent:.3} as {end}"
        )));
    }
    Ok(body + edge * cutoff / (1.0 - exponent))
}

/// `a` in `f(u) ~ C u^-a`, from `edge = f(u)` and `inner = f(u 2^EXPONENT_SPAN)`.
///
/// Zero when either value vanishes or the signs differ; infinite when the
/// integrand already overflowed.
fn tail_exponent(edge: f64, inner: f64) -> f64 {
    if !edge.is_finite() || !inner.is_finite() {
        return f64::INFINITY;
    }
    if edge == 0.0 || inner == 0.0 || edge.is_sign_positive() != inner.is_sign_positive() {
        return 0.0;
    }
    (edge / inner).ln() / (f64::from(EXPONENT_SPAN) * LN_2)
}

/// Population mean of `dist`: closed form, else quadrature of its quantile.
///
/// # Errors
///
/// [`Error::Configuration`] when the quadrature detects a divergent mean.
pub fn population_mean(dist: &dyn OutcomeDistribution) -> Result<f64> {
    match dist.mean() {
        Some(mean) => Ok(mean),
        None => integrate_probability(
            "population mean",
            |p| dist.quantile(p),
            |q| dist.upper_quantile(q),
        ),
    }
}

/// `E[F01^{-1}(F00(Y10))]`, the treated group's post-period mean had it not
/// been treated.
///
/// Treated-pre mass beyond the control-pre support is mapped to the extreme
/// control-post quantile at rank `f64::MIN_POSITIVE`.
///
/// # Errors
///
/// [`Error::Configuration`] when the expectation diverges, e.g. a Pareto
/// control-post tail too heavy for the treated-pre tail it is composed with.
pub fn counterfactual_mean(distributions: &DistributionSet) -> Result<f64> {
    let control_pre = distributions.get(Group::ControlPre);
    let control_post = distributions.get(Group::ControlPost);
    let treated_pre = distributions.get(Group::TreatedPre);
    integrate_probability(
        "counterfactual mean of the treated group",
        |p| {
            let rank = control_pre
                .cdf(treated_pre.quantile(p))
                .clamp(f64::MIN_POSITIVE, ONE_MINUS);
            control_post.quantile(rank)
        },
        |q| {
            let rank = control_pre
                .sf(treated_pre.upper_quantile(q))
                .clamp(f64::MIN_POSITIVE, ONE_MINUS);
            control_post.upper_quantile(rank)
        },
    )
}

/// True CiC treatment effect on the treated.
///
/// # Errors
///
/// [`Error::Configuration`] when either mean is infinite (e.g. a Pareto
/// treated-post group with shape <= 1) or cannot be integrated.
pub fn true_effect(distributions: &DistributionSet) -> Result<f64> {
    let treated = population_mean(distributions.get(Group::TreatedPost))?;
    if !treated.is_finite() {
        return Err(Error::Configuration(format!(
            "treated_post distribution has non-finite mean ({treated})"
        )));
    }
    let counterfactual = counterfactual_mean(distributions)?;
    let effect = treated - counterfactual;
    debug!(treated, counterfactual, effect, "computed true effect");
    Ok(effect)
}
