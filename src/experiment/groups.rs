//! Per-group sample sizes and outcome distributions.

use serde::{Deserialize, Serialize};

use crate::data::Group;
use crate::distribution::{DistributionSet, DistributionSpec};
use crate::{Error, Result};

/// Sample size of each of the four CiC groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSizes {
    /// Control group, pre-treatment period
    pub control_pre: usize,
    /// Control group, post-treatment period
    pub control_post: usize,
    /// Treated group, pre-treatment period
    pub treated_pre: usize,
    /// Treated group, post-treatment period
    pub treated_post: usize,
}

impl GroupSizes {
    /// Same size `n` for every group.
    #[must_use]
    pub const fn uniform(n: usize) -> Self {
        Self {
            control_pre: n,
            control_post: n,
            treated_pre: n,
            treated_post: n,
        }
    }

    /// Size of `group`.
    #[must_use]
    pub const fn get(&self, group: Group) -> usize {
        match group {
            Group::ControlPre => self.control_pre,
            Group::ControlPost => self.control_post,
            Group::TreatedPre => self.treated_pre,
            Group::TreatedPost => self.treated_post,
        }
    }

    /// Smallest group size; the `n` used for root-n scaled errors.
    #[must_use]
    pub fn min(&self) -> usize {
        Group::ALL.iter().map(|&g| self.get(g)).min().unwrap_or(0)
    }

    /// Total number of observations across groups.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.control_pre + self.control_post + self.treated_pre + self.treated_post
    }

    /// Every group needs at least two observations for the estimator to exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first undersized group.
    pub fn validate(&self) -> Result<()> {
        for group in Group::ALL {
            let n = self.get(group);
            if n < 2 {
                return Err(Error::Configuration(format!(
                    "sample size of group {group} must be at least 2, got {n}"
                )));
            }
        }
        Ok(())
    }
}

/// Declared outcome distribution of each group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDistributions {
    /// Control group, pre-treatment period (`F00`)
    pub control_pre: DistributionSpec,
    /// Control group, post-treatment period (`F01`)
    pub control_post: DistributionSpec,
    /// Treated group, pre-treatment period (`F10`)
    pub treated_pre: DistributionSpec,
    /// Treated group, post-treatment period (`F11`)
    pub treated_post: DistributionSpec,
}

impl GroupDistributions {
    /// Location-shift CiC model on a common `base` distribution:
    ///
    /// ```text
    /// Y00 ~ base                 Y01 ~ base + time
    /// Y10 ~ base + group         Y11 ~ base + group + time + effect
    /// ```
    ///
    /// The true CiC effect of this model is exactly `effect`.
    #[must_use]
    pub fn location_shift(base: DistributionSpec, time: f64, group: f64, effect: f64) -> Self {
        Self {
            control_post: DistributionSpec::shifted(base.clone(), time),
            treated_pre: DistributionSpec::shifted(base.clone(), group),
            treated_post: DistributionSpec::shifted(base.clone(), group + time + effect),
            control_pre: base,
        }
    }

    /// Declared distribution of `group`.
    #[must_use]
    pub const fn get(&self, group: Group) -> &DistributionSpec {
        match group {
            Group::ControlPre => &self.control_pre,
            Group::ControlPost => &self.control_post,
            Group::TreatedPre => &self.treated_pre,
            Group::TreatedPost => &self.treated_post,
        }
    }

    /// Build all four samplers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the group whose distribution
    /// is invalid.
    pub fn build(&self) -> Result<DistributionSet> {
        let build = |group: Group| {
            self.get(group).build().map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::Configuration(format!("group {group}: {msg}"))
                }
                other => other,
            })
        };
        Ok(DistributionSet::new(
            build(Group::ControlPre)?,
            build(Group::ControlPost)?,
            build(Group::TreatedPre)?,
            build(Group::TreatedPost)?,
        ))
    }
}
