//! FlagManager: feature-flag creation and state mutations.

use std::sync::Arc;

use tracing::{info, warn};

use cohort_core::constants::MAX_PERCENTAGE;
use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::flag_span;
use cohort_core::models::{EventType, FeatureFlag, FlagStatus, FlagUpdate};
use cohort_core::traits::IFlagStorage;

use crate::events::EventRecorder;

pub struct FlagManager {
    storage: Arc<dyn IFlagStorage>,
    events: Option<Arc<EventRecorder>>,
    default_environment: String,
}

impl FlagManager {
    pub fn new(storage: Arc<dyn IFlagStorage>, default_environment: impl Into<String>) -> Self {
        Self {
            storage,
            events: None,
            default_environment: default_environment.into(),
        }
    }

    pub fn with_events(mut self, events: Arc<EventRecorder>) -> Self {
        self.events = Some(events);
        self
    }

    /// New flags start disabled, INACTIVE, at 0% rollout.
    pub fn create(
        &self,
        name: &str,
        description: Option<&str>,
        environment: Option<&str>,
        created_by: Option<&str>,
    ) -> CohortResult<FeatureFlag> {
        if name.trim().is_empty() {
            return Err(CohortError::validation("name", "must not be blank"));
        }
        let environment = environment.unwrap_or(&self.default_environment);
        if environment.trim().is_empty() {
            return Err(CohortError::validation("environment", "must not be blank"));
        }
        if self.storage.get_flag_by_name(name, environment)?.is_some() {
            return Err(CohortError::conflict(format!(
                "flag '{name}' already exists in environment '{environment}'"
            )));
        }

        let mut flag = FeatureFlag::new(name, environment);
        flag.description = description.map(str::to_string);
        flag.created_by = created_by.map(str::to_string);
        let created = self.storage.create_flag(&flag)?;
        info!(flag_id = created.id, name, environment, "flag created");
        Ok(created)
    }

    pub fn get(&self, flag_id: u64) -> CohortResult<FeatureFlag> {
        self.storage
            .get_flag(flag_id)?
            .ok_or_else(|| CohortError::not_found("flag", flag_id))
    }

    pub fn get_by_name(&self, name: &str, environment: &str) -> CohortResult<Option<FeatureFlag>> {
        self.storage.get_flag_by_name(name, environment)
    }

    pub fn list(&self, environment: &str) -> CohortResult<Vec<FeatureFlag>> {
        self.storage.list_flags_by_environment(environment)
    }

    /// Rename, re-describe or move a flag to another environment. The
    /// `(name, environment)` pair must stay unique.
    pub fn update(&self, flag_id: u64, update: FlagUpdate) -> CohortResult<FeatureFlag> {
        if update.name.trim().is_empty() {
            return Err(CohortError::validation("name", "must not be blank"));
        }
        if update.environment.trim().is_empty() {
            return Err(CohortError::validation("environment", "must not be blank"));
        }
        if let Some(other) = self.storage.get_flag_by_name(&update.name, &update.environment)? {
            if other.id != flag_id {
                return Err(CohortError::conflict(format!(
                    "flag '{}' already exists in environment '{}'",
                    update.name, update.environment
                )));
            }
        }
        self.mutate(flag_id, "update", "", None, move |flag| {
            flag.name = update.name;
            flag.description = update.description;
            flag.environment = update.environment;
        })
    }

    /// Flip `enabled`; INACTIVE becomes ACTIVE when enabling and vice versa.
    pub fn toggle(&self, flag_id: u64, actor: &str) -> CohortResult<FeatureFlag> {
        self.mutate(flag_id, "toggle", actor, Some(EventType::FlagToggled), |flag| flag.toggle())
    }

    pub fn enable(&self, flag_id: u64, actor: &str) -> CohortResult<FeatureFlag> {
        self.mutate(flag_id, "enable", actor, Some(EventType::FlagEnabled), |flag| flag.enable())
    }

    pub fn disable(&self, flag_id: u64, actor: &str) -> CohortResult<FeatureFlag> {
        self.mutate(flag_id, "disable", actor, Some(EventType::FlagDisabled), |flag| flag.disable())
    }

    pub fn enable_by_name(
        &self,
        name: &str,
        environment: &str,
        actor: &str,
    ) -> CohortResult<FeatureFlag> {
        let flag = self.require_by_name(name, environment)?;
        self.enable(flag.id, actor)
    }

    pub fn disable_by_name(
        &self,
        name: &str,
        environment: &str,
        actor: &str,
    ) -> CohortResult<FeatureFlag> {
        let flag = self.require_by_name(name, environment)?;
        self.disable(flag.id, actor)
    }

    /// ARCHIVED is final: later toggles, enables and disables are refused.
    pub fn archive(&self, flag_id: u64, actor: &str) -> CohortResult<FeatureFlag> {
        self.mutate(flag_id, "archive", actor, Some(EventType::FlagDisabled), |flag| flag.archive())
    }

    pub fn set_rollout(&self, flag_id: u64, percentage: u8) -> CohortResult<FeatureFlag> {
        validate_rollout(percentage)?;
        self.mutate(flag_id, "set_rollout", "", None, |flag| flag.rollout_percentage = percentage)
    }

    /// Raise the rollout by `delta`, capped at 100.
    pub fn increase_rollout(&self, flag_id: u64, delta: u8) -> CohortResult<FeatureFlag> {
        self.mutate(flag_id, "increase_rollout", "", None, |flag| {
            flag.rollout_percentage = flag
                .rollout_percentage
                .saturating_add(delta)
                .min(MAX_PERCENTAGE);
        })
    }

    /// Enable each flag in order. Stops at the first failure; flags before
    /// it stay enabled.
    pub fn enable_many(&self, flag_ids: &[u64], actor: &str) -> CohortResult<Vec<FeatureFlag>> {
        info!(count = flag_ids.len(), "enabling flags");
        flag_ids.iter().map(|&id| self.enable(id, actor)).collect()
    }

    /// Disable each flag in order. Stops at the first failure.
    pub fn disable_many(&self, flag_ids: &[u64], actor: &str) -> CohortResult<Vec<FeatureFlag>> {
        info!(count = flag_ids.len(), "disabling flags");
        flag_ids.iter().map(|&id| self.disable(id, actor)).collect()
    }

    /// Set one rollout on every flag. The percentage is checked before any
    /// flag changes; after that, stops at the first failure.
    pub fn set_rollout_many(
        &self,
        flag_ids: &[u64],
        percentage: u8,
    ) -> CohortResult<Vec<FeatureFlag>> {
        validate_rollout(percentage)?;
        info!(count = flag_ids.len(), percentage, "updating rollout for flags");
        flag_ids
            .iter()
            .map(|&id| self.set_rollout(id, percentage))
            .collect()
    }

    fn require_by_name(&self, name: &str, environment: &str) -> CohortResult<FeatureFlag> {
        self.storage
            .get_flag_by_name(name, environment)?
            .ok_or_else(|| CohortError::not_found("flag", format!("{name}@{environment}")))
    }

    fn mutate<F>(
        &self,
        flag_id: u64,
        operation: &'static str,
        actor: &str,
        event_type: Option<EventType>,
        change: F,
    ) -> CohortResult<FeatureFlag>
    where
        F: FnOnce(&mut FeatureFlag),
    {
        let _span = flag_span!(operation, flag_id).entered();
        let mut flag = self.get(flag_id)?;
        let before = flag.status;
        if before == FlagStatus::Archived {
            return Err(CohortError::invalid_state("flag", operation, before));
        }

        change(&mut flag);
        let saved = self
            .storage
            .save_flag(&flag, before)
            .map_err(|e| e.for_operation(operation))?;
        info!(
            enabled = saved.enabled,
            status = %saved.status,
            rollout = saved.rollout_percentage,
            "flag updated"
        );

        if let (Some(events), Some(event_type)) = (&self.events, event_type) {
            if let Err(e) = events.track_flag_change(actor, &saved, event_type) {
                warn!(error = %e, "flag change event not recorded");
            }
        }
        Ok(saved)
    }
}

fn validate_rollout(percentage: u8) -> CohortResult<()> {
    if percentage > MAX_PERCENTAGE {
        return Err(CohortError::validation(
            "rollout_percentage",
            format!("must be between 0 and {MAX_PERCENTAGE}, got {percentage}"),
        ));
    }
    Ok(())
}
