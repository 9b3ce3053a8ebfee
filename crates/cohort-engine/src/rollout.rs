//! Feature-flag rollout evaluation.

use std::sync::Arc;

use cohort_core::constants::MAX_PERCENTAGE;
use cohort_core::errors::CohortResult;
use cohort_core::models::FeatureFlag;
use cohort_core::traits::IFlagStorage;
use tracing::debug;

use crate::hashing::percentile;

/// Stateless rollout check.
pub struct RolloutEvaluator;

impl RolloutEvaluator {
    /// Whether `flag` is on for `user_id` in `environment`.
    ///
    /// Short-circuits on: inactive flag, environment mismatch, 0% and 100%
    /// rollout. Otherwise buckets the user by the flag name.
    pub fn enabled_for(flag: &FeatureFlag, user_id: &str, environment: &str) -> bool {
        if !flag.is_active() {
            return false;
        }
        if flag.environment != environment {
            return false;
        }
        match flag.rollout_percentage {
            0 => false,
            pct if pct >= MAX_PERCENTAGE => true,
            pct => percentile(user_id, &flag.name) <= pct,
        }
    }
}

/// Looks a flag up by name and evaluates it.
pub struct FlagEvaluator {
    storage: Arc<dyn IFlagStorage>,
}

impl FlagEvaluator {
    pub fn new(storage: Arc<dyn IFlagStorage>) -> Self {
        Self { storage }
    }

    /// A flag that does not exist in `environment` is off.
    pub fn is_enabled_for_user(
        &self,
        flag_name: &str,
        user_id: &str,
        environment: &str,
    ) -> CohortResult<bool> {
        let Some(flag) = self.storage.get_flag_by_name(flag_name, environment)? else {
            debug!(flag = flag_name, environment, "flag not found, evaluating to false");
            return Ok(false);
        };
        let enabled = RolloutEvaluator::enabled_for(&flag, user_id, environment);
        debug!(flag = flag_name, user_id, enabled, "flag evaluated");
        Ok(enabled)
    }

    /// Every flag in `environment` that is on for `user_id`, by name.
    pub fn available_flags_for_user(
        &self,
        user_id: &str,
        environment: &str,
    ) -> CohortResult<Vec<FeatureFlag>> {
        let mut flags = self.storage.list_flags_by_environment(environment)?;
        flags.retain(|flag| RolloutEvaluator::enabled_for(flag, user_id, environment));
        debug!(user_id, environment, count = flags.len(), "available flags evaluated");
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(rollout: u8) -> FeatureFlag {
        let mut flag = FeatureFlag::new("new_checkout", "production");
        flag.enable();
        flag.rollout_percentage = rollout;
        flag
    }

    #[test]
    fn zero_rollout_is_off_for_everyone() {
        let flag = active(0);
        assert!((0..500).all(|i| !RolloutEvaluator::enabled_for(&flag, &format!("u{i}"), "production")));
    }

    #[test]
    fn full_rollout_is_on_for_everyone() {
        let flag = active(100);
        assert!((0..500).all(|i| RolloutEvaluator::enabled_for(&flag, &format!("u{i}"), "production")));
    }

    #[test]
    fn environment_must_match_exactly() {
        let flag = active(100);
        assert!(!RolloutEvaluator::enabled_for(&flag, "u1", "staging"));
        assert!(!RolloutEvaluator::enabled_for(&flag, "u1", "Production"));
    }

    #[test]
    fn inactive_flag_is_off() {
        let mut flag = active(100);
        flag.disable();
        assert!(!RolloutEvaluator::enabled_for(&flag, "u1", "production"));

        let mut deprecated = active(100);
        deprecated.status = cohort_core::models::FlagStatus::Deprecated;
        assert!(!RolloutEvaluator::enabled_for(&deprecated, "u1", "production"));
    }

    #[test]
    fn partial_rollout_matches_percentile() {
        let flag = active(30);
        for i in 0..200 {
            let user = format!("u{i}");
            let expected = percentile(&user, "new_checkout") <= 30;
            assert_eq!(RolloutEvaluator::enabled_for(&flag, &user, "production"), expected);
        }
    }
}
