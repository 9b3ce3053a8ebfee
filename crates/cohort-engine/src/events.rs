//! EventRecorder: append-only fact log over `IEventStorage`.

use std::sync::Arc;

use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::models::{Assignment, Event, EventType, FeatureFlag};
use cohort_core::traits::IEventStorage;
use serde_json::json;

/// Builds and appends [`Event`]s. Never updates or deletes.
pub struct EventRecorder {
    storage: Arc<dyn IEventStorage>,
}

impl EventRecorder {
    pub fn new(storage: Arc<dyn IEventStorage>) -> Self {
        Self { storage }
    }

    /// EXPERIMENT_ASSIGNMENT for a freshly written assignment.
    pub fn track_assignment(&self, assignment: &Assignment) -> CohortResult<Event> {
        let mut event = Event::new(
            &assignment.user_id,
            EventType::ExperimentAssignment,
            &assignment.environment,
        );
        event.experiment_id = Some(assignment.experiment_id);
        event.variant_name = Some(assignment.variant_name.clone());
        event.session_id = assignment.session_id.clone();
        event.properties = json!({
            "cohort_type": assignment.cohort_type.as_str(),
            "assignment_method": assignment.assignment_method.as_str(),
        });
        self.storage.append_event(&event)
    }

    /// EXPERIMENT_EXPOSURE carrying the running exposure count.
    pub fn track_exposure(&self, assignment: &Assignment) -> CohortResult<Event> {
        let mut event = Event::new(
            &assignment.user_id,
            EventType::ExperimentExposure,
            &assignment.environment,
        );
        event.experiment_id = Some(assignment.experiment_id);
        event.variant_name = Some(assignment.variant_name.clone());
        event.session_id = assignment.session_id.clone();
        event.properties = json!({ "exposure_count": assignment.exposure_count });
        self.storage.append_event(&event)
    }

    pub fn track_conversion(
        &self,
        user_id: &str,
        experiment_id: u64,
        variant_name: &str,
        value: Option<f64>,
        environment: &str,
    ) -> CohortResult<Event> {
        if user_id.trim().is_empty() {
            return Err(CohortError::validation("user_id", "must not be blank"));
        }
        let mut event = Event::new(user_id, EventType::Conversion, environment);
        event.experiment_id = Some(experiment_id);
        event.variant_name = Some(variant_name.to_string());
        event.event_value = value;
        self.storage.append_event(&event)
    }

    /// FLAG_EXPOSURE with the evaluated result.
    pub fn track_flag_exposure(
        &self,
        user_id: &str,
        flag: &FeatureFlag,
        enabled: bool,
    ) -> CohortResult<Event> {
        let mut event = Event::new(user_id, EventType::FlagExposure, &flag.environment);
        event.flag_id = Some(flag.id);
        event.event_name = flag.name.clone();
        event.properties = json!({ "enabled": enabled });
        self.storage.append_event(&event)
    }

    /// FLAG_TOGGLED / FLAG_ENABLED / FLAG_DISABLED attributed to `actor`.
    pub fn track_flag_change(
        &self,
        actor: &str,
        flag: &FeatureFlag,
        event_type: EventType,
    ) -> CohortResult<Event> {
        let mut event = Event::new(actor, event_type, &flag.environment);
        event.flag_id = Some(flag.id);
        event.event_name = flag.name.clone();
        event.properties = json!({
            "enabled": flag.enabled,
            "status": flag.status.as_str(),
            "rollout_percentage": flag.rollout_percentage,
        });
        self.storage.append_event(&event)
    }

    pub fn events_for_user(&self, user_id: &str) -> CohortResult<Vec<Event>> {
        self.storage.events_for_user(user_id)
    }

    pub fn events_for_experiment(&self, experiment_id: u64) -> CohortResult<Vec<Event>> {
        self.storage.events_for_experiment(experiment_id)
    }
}
