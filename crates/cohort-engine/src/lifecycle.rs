//! ExperimentLifecycle: creation, DRAFT edits and status transitions.
//!
//! ```text
//! DRAFT → READY → RUNNING ⇄ PAUSED → COMPLETED → ARCHIVED
//!   └───────┴────────┴─────────┴──→ CANCELLED → ARCHIVED
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use cohort_core::constants::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_CONTROL_VARIANT, DEFAULT_TEST_VARIANT, MAX_PERCENTAGE,
    MIN_TRAFFIC_PERCENTAGE,
};
use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::lifecycle_span;
use cohort_core::models::{Experiment, ExperimentStatus, ExperimentUpdate, NewExperiment};
use cohort_core::traits::IExperimentStorage;

/// A status change requested on an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    MarkReady,
    Start,
    Pause,
    Complete,
    Archive,
    Cancel,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarkReady => "mark_ready",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Complete => "complete",
            Self::Archive => "archive",
            Self::Cancel => "cancel",
        }
    }

    /// Target status if `self` is legal from `from`.
    pub fn target(self, from: ExperimentStatus) -> Option<ExperimentStatus> {
        use ExperimentStatus::*;
        match (self, from) {
            (Self::MarkReady, Draft) => Some(Ready),
            (Self::Start, Ready | Paused) => Some(Running),
            (Self::Pause, Running) => Some(Paused),
            (Self::Complete, Running | Paused) => Some(Completed),
            (Self::Archive, Completed | Cancelled) => Some(Archived),
            (Self::Cancel, s) if !s.is_terminal() && s != Cancelled => Some(Cancelled),
            _ => None,
        }
    }
}

/// Apply `transition` in place, or fail leaving `experiment` untouched.
pub fn apply_transition(
    experiment: &mut Experiment,
    transition: Transition,
    now: DateTime<Utc>,
) -> CohortResult<()> {
    let target = transition
        .target(experiment.status)
        .ok_or_else(|| CohortError::InvalidState {
            entity: "experiment",
            operation: transition.as_str(),
            status: experiment.status.to_string(),
        })?;

    if transition == Transition::MarkReady {
        validate_settings(
            &experiment.name,
            &experiment.control_variant_name,
            &experiment.test_variant_name,
            experiment.traffic_percentage,
        )?;
    }

    match transition {
        Transition::Start if experiment.start_date.is_none() => experiment.start_date = Some(now),
        Transition::Complete | Transition::Cancel => experiment.end_date = Some(now),
        _ => {}
    }
    experiment.status = target;
    experiment.updated_at = now;
    Ok(())
}

/// Name, variants and traffic checks shared by create, update and mark_ready.
pub fn validate_settings(
    name: &str,
    control_variant: &str,
    test_variant: &str,
    traffic_percentage: u8,
) -> CohortResult<()> {
    if name.trim().is_empty() {
        return Err(CohortError::validation("name", "must not be blank"));
    }
    validate_traffic(traffic_percentage)?;
    if control_variant.trim().is_empty() {
        return Err(CohortError::validation("control_variant_name", "must not be blank"));
    }
    if test_variant.trim().is_empty() {
        return Err(CohortError::validation("test_variant_name", "must not be blank"));
    }
    if control_variant == test_variant {
        return Err(CohortError::validation(
            "test_variant_name",
            "must differ from the control variant",
        ));
    }
    Ok(())
}

fn validate_traffic(traffic_percentage: u8) -> CohortResult<()> {
    if !(MIN_TRAFFIC_PERCENTAGE..=MAX_PERCENTAGE).contains(&traffic_percentage) {
        return Err(CohortError::validation(
            "traffic_percentage",
            format!("must be between {MIN_TRAFFIC_PERCENTAGE} and {MAX_PERCENTAGE}, got {traffic_percentage}"),
        ));
    }
    Ok(())
}

/// Store-backed lifecycle operations.
pub struct ExperimentLifecycle {
    storage: Arc<dyn IExperimentStorage>,
    default_environment: String,
}

impl ExperimentLifecycle {
    pub fn new(storage: Arc<dyn IExperimentStorage>, default_environment: impl Into<String>) -> Self {
        Self {
            storage,
            default_environment: default_environment.into(),
        }
    }

    /// Validate and persist a new DRAFT experiment.
    ///
    /// Empty variant names and environment take their defaults; whitespace-only
    /// values are rejected.
    pub fn create(&self, new: NewExperiment) -> CohortResult<Experiment> {
        let control = or_default(new.control_variant_name, DEFAULT_CONTROL_VARIANT);
        let test = or_default(new.test_variant_name, DEFAULT_TEST_VARIANT);
        let environment = or_default(new.environment, &self.default_environment);

        validate_settings(&new.name, &control, &test, new.traffic_percentage)?;
        if environment.trim().is_empty() {
            return Err(CohortError::validation("environment", "must not be blank"));
        }
        if self.storage.get_experiment_by_name(&new.name)?.is_some() {
            return Err(CohortError::conflict(format!(
                "experiment '{}' already exists",
                new.name
            )));
        }

        let mut experiment = Experiment::draft(new.name);
        experiment.description = new.description;
        experiment.hypothesis = new.hypothesis;
        experiment.traffic_percentage = new.traffic_percentage;
        experiment.control_variant_name = control;
        experiment.test_variant_name = test;
        experiment.environment = environment;
        experiment.success_metric = new.success_metric;
        experiment.expected_improvement = new.expected_improvement;
        experiment.confidence_level = DEFAULT_CONFIDENCE_LEVEL;
        experiment.minimum_sample_size = new.minimum_sample_size;
        experiment.created_by = new.created_by;

        let created = self.storage.create_experiment(&experiment)?;
        info!(experiment_id = created.id, name = %created.name, "experiment created");
        Ok(created)
    }

    /// Edit settings. Legal only in DRAFT, checked again at write time so an
    /// experiment that left DRAFT concurrently is never edited.
    pub fn update(&self, experiment_id: u64, update: ExperimentUpdate) -> CohortResult<Experiment> {
        let _span = lifecycle_span!("update", experiment_id).entered();
        let mut experiment = self.get(experiment_id)?;
        if experiment.status != ExperimentStatus::Draft {
            return Err(CohortError::invalid_state("experiment", "update", experiment.status));
        }
        validate_settings(
            &update.name,
            &experiment.control_variant_name,
            &experiment.test_variant_name,
            update.traffic_percentage,
        )?;
        if update.name != experiment.name {
            if let Some(other) = self.storage.get_experiment_by_name(&update.name)? {
                if other.id != experiment_id {
                    return Err(CohortError::conflict(format!(
                        "experiment '{}' already exists",
                        update.name
                    )));
                }
            }
        }

        experiment.name = update.name;
        experiment.description = update.description;
        experiment.hypothesis = update.hypothesis;
        experiment.traffic_percentage = update.traffic_percentage;
        experiment.success_metric = update.success_metric;
        experiment.updated_at = Utc::now();

        let saved = self
            .storage
            .save_experiment(&experiment, ExperimentStatus::Draft)
            .map_err(|e| e.for_operation("update"))?;
        info!("experiment updated");
        Ok(saved)
    }

    pub fn mark_ready(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.transition(experiment_id, Transition::MarkReady)
    }

    pub fn start(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.transition(experiment_id, Transition::Start)
    }

    pub fn pause(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.transition(experiment_id, Transition::Pause)
    }

    pub fn complete(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.transition(experiment_id, Transition::Complete)
    }

    pub fn archive(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.transition(experiment_id, Transition::Archive)
    }

    pub fn cancel(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.transition(experiment_id, Transition::Cancel)
    }

    pub fn get(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.storage
            .get_experiment(experiment_id)?
            .ok_or_else(|| CohortError::not_found("experiment", experiment_id))
    }

    pub fn get_by_name(&self, name: &str) -> CohortResult<Option<Experiment>> {
        self.storage.get_experiment_by_name(name)
    }

    pub fn list_by_status(&self, status: ExperimentStatus) -> CohortResult<Vec<Experiment>> {
        self.storage.list_experiments_by_status(status)
    }

    /// RUNNING and PAUSED experiments.
    pub fn list_active(&self) -> CohortResult<Vec<Experiment>> {
        let mut active = self.list_by_status(ExperimentStatus::Running)?;
        active.extend(self.list_by_status(ExperimentStatus::Paused)?);
        Ok(active)
    }

    /// Read, apply, then write guarded on the status the decision was made
    /// from. A concurrent transition in between fails this one.
    fn transition(&self, experiment_id: u64, transition: Transition) -> CohortResult<Experiment> {
        let _span = lifecycle_span!(transition.as_str(), experiment_id).entered();
        let mut experiment = self.get(experiment_id)?;
        let from = experiment.status;
        apply_transition(&mut experiment, transition, Utc::now())?;
        let saved = self
            .storage
            .save_experiment(&experiment, from)
            .map_err(|e| e.for_operation(transition.as_str()))?;
        info!(from = %from, to = %saved.status, "experiment transitioned");
        Ok(saved)
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExperimentStatus::*;

    const TRANSITIONS: [Transition; 6] = [
        Transition::MarkReady,
        Transition::Start,
        Transition::Pause,
        Transition::Complete,
        Transition::Archive,
        Transition::Cancel,
    ];

    #[test]
    fn transition_table() {
        let legal = [
            (Transition::MarkReady, Draft, Ready),
            (Transition::Start, Ready, Running),
            (Transition::Start, Paused, Running),
            (Transition::Pause, Running, Paused),
            (Transition::Complete, Running, Completed),
            (Transition::Complete, Paused, Completed),
            (Transition::Archive, Completed, Archived),
            (Transition::Archive, Cancelled, Archived),
            (Transition::Cancel, Draft, Cancelled),
            (Transition::Cancel, Ready, Cancelled),
            (Transition::Cancel, Running, Cancelled),
            (Transition::Cancel, Paused, Cancelled),
        ];
        for t in TRANSITIONS {
            for from in ExperimentStatus::ALL {
                let expected = legal
                    .iter()
                    .find(|(lt, lf, _)| *lt == t && *lf == from)
                    .map(|(_, _, to)| *to);
                assert_eq!(t.target(from), expected, "{} from {from}", t.as_str());
            }
        }
    }

    #[test]
    fn illegal_transition_leaves_record_unchanged() {
        let mut exp = Experiment::draft("x");
        let before = exp.clone();
        let err = apply_transition(&mut exp, Transition::Start, Utc::now()).unwrap_err();
        assert!(matches!(err, CohortError::InvalidState { operation: "start", .. }));
        assert_eq!(exp, before);
    }

    #[test]
    fn restart_keeps_original_start_date() {
        let mut exp = Experiment::draft("x");
        exp.status = Ready;
        let t0 = Utc::now();
        apply_transition(&mut exp, Transition::Start, t0).unwrap();
        apply_transition(&mut exp, Transition::Pause, t0).unwrap();
        let later = t0 + chrono::Duration::hours(1);
        apply_transition(&mut exp, Transition::Start, later).unwrap();
        assert_eq!(exp.start_date, Some(t0));
    }

    #[test]
    fn complete_and_cancel_set_end_date() {
        let mut exp = Experiment::draft("x");
        exp.status = Running;
        apply_transition(&mut exp, Transition::Complete, Utc::now()).unwrap();
        assert!(exp.end_date.is_some());

        let mut draft = Experiment::draft("y");
        apply_transition(&mut draft, Transition::Cancel, Utc::now()).unwrap();
        assert_eq!(draft.status, Cancelled);
        assert!(draft.end_date.is_some());
    }

    #[test]
    fn mark_ready_revalidates_settings() {
        let mut exp = Experiment::draft("x");
        exp.test_variant_name = exp.control_variant_name.clone();
        let err = apply_transition(&mut exp, Transition::MarkReady, Utc::now()).unwrap_err();
        assert!(matches!(err, CohortError::Validation { field: "test_variant_name", .. }));
        assert_eq!(exp.status, Draft);
    }

    #[test]
    fn settings_validation() {
        assert!(validate_settings("n", "a", "b", 1).is_ok());
        assert!(validate_settings("n", "a", "b", 100).is_ok());
        assert!(validate_settings(" ", "a", "b", 50).is_err());
        assert!(validate_settings("n", "a", "b", 0).is_err());
        assert!(validate_settings("n", "a", "b", 101).is_err());
        assert!(validate_settings("n", "", "b", 50).is_err());
        assert!(validate_settings("n", "a", "a", 50).is_err());
    }
}
