//! CohortAssigner: deterministic, idempotent experiment assignment.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::models::{
    Assignment, AssignmentMethod, CohortType, Event, Experiment, ExperimentStatus, InsertOutcome,
};
use cohort_core::traits::IExperimentStorage;
use cohort_core::{assignment_span, exposure_span};

use crate::events::EventRecorder;
use crate::hashing::{cohort_hash, percentile};
use crate::traffic::included;

/// Assigns users to experiment arms and records exposures.
///
/// Every decision is a pure function of `(user_id, experiment.name)`, and the
/// first persisted decision for a pair is final: later calls, including
/// concurrent ones that lost the insert race, return the stored row.
pub struct CohortAssigner {
    storage: Arc<dyn IExperimentStorage>,
    events: Option<Arc<EventRecorder>>,
}

impl CohortAssigner {
    pub fn new(storage: Arc<dyn IExperimentStorage>) -> Self {
        Self {
            storage,
            events: None,
        }
    }

    /// Emit EXPERIMENT_ASSIGNMENT / EXPERIMENT_EXPOSURE events through `events`.
    pub fn with_events(mut self, events: Arc<EventRecorder>) -> Self {
        self.events = Some(events);
        self
    }

    /// Hash-based assignment of a RUNNING experiment.
    pub fn assign(
        &self,
        user_id: &str,
        experiment_id: u64,
        session_id: Option<&str>,
    ) -> CohortResult<Assignment> {
        validate_user_id(user_id)?;
        let _span = assignment_span!(user_id, experiment_id).entered();

        let experiment = self.load_experiment(experiment_id)?;
        if !experiment.is_running() {
            return Err(CohortError::InvalidState {
                entity: "experiment",
                operation: "assign",
                status: experiment.status.to_string(),
            });
        }

        if let Some(existing) = self.storage.find_assignment(user_id, experiment_id)? {
            debug!(cohort = %existing.cohort_type, "existing assignment returned");
            return Ok(existing);
        }

        let mut candidate = decide(&experiment, user_id);
        candidate.session_id = session_id.map(str::to_string);

        match self.storage.insert_assignment_counted(&candidate)? {
            InsertOutcome::Inserted(stored) => {
                info!(
                    cohort = %stored.cohort_type,
                    variant = %stored.variant_name,
                    "user assigned"
                );
                self.emit(|events| events.track_assignment(&stored));
                Ok(stored)
            }
            InsertOutcome::Existing(stored) => {
                debug!(cohort = %stored.cohort_type, "concurrent assignment won the insert");
                Ok(stored)
            }
        }
    }

    /// Force a user into `cohort_type`, bypassing hashing.
    ///
    /// Fails with `Conflict` if the user already has an assignment, including
    /// one written concurrently between the check and the insert.
    pub fn assign_manual(
        &self,
        user_id: &str,
        experiment_id: u64,
        method: AssignmentMethod,
        cohort_type: CohortType,
    ) -> CohortResult<Assignment> {
        validate_user_id(user_id)?;
        let _span = assignment_span!(user_id, experiment_id).entered();

        let experiment = self.load_experiment(experiment_id)?;
        if self.storage.find_assignment(user_id, experiment_id)?.is_some() {
            return Err(already_assigned(user_id, experiment_id));
        }

        let mut candidate = Assignment::new(
            user_id,
            experiment_id,
            cohort_type,
            experiment.variant_for(cohort_type),
            method,
        );
        candidate.environment = experiment.environment.clone();

        match self.storage.insert_assignment_counted(&candidate)? {
            InsertOutcome::Inserted(stored) => {
                info!(cohort = %stored.cohort_type, method = %method, "user manually assigned");
                self.emit(|events| events.track_assignment(&stored));
                Ok(stored)
            }
            InsertOutcome::Existing(_) => Err(already_assigned(user_id, experiment_id)),
        }
    }

    /// Stamp an exposure on an existing assignment.
    pub fn record_exposure(&self, user_id: &str, experiment_id: u64) -> CohortResult<Assignment> {
        validate_user_id(user_id)?;
        let _span = exposure_span!(user_id, experiment_id).entered();

        let updated = self
            .storage
            .record_exposure(user_id, experiment_id, Utc::now())?;
        debug!(exposure_count = updated.exposure_count, "exposure recorded");
        self.emit(|events| events.track_exposure(&updated));
        Ok(updated)
    }

    /// RUNNING experiments in `environment` whose traffic gate includes the
    /// user. Nothing is persisted.
    pub fn eligible_experiments(
        &self,
        user_id: &str,
        environment: &str,
    ) -> CohortResult<Vec<Experiment>> {
        validate_user_id(user_id)?;
        let mut running = self.storage.list_experiments_by_status(ExperimentStatus::Running)?;
        running.retain(|e| {
            e.environment == environment
                && included(percentile(user_id, &e.name), e.traffic_percentage)
        });
        Ok(running)
    }

    pub fn get_assignment(
        &self,
        user_id: &str,
        experiment_id: u64,
    ) -> CohortResult<Option<Assignment>> {
        self.storage.find_assignment(user_id, experiment_id)
    }

    pub fn is_assigned(&self, user_id: &str, experiment_id: u64) -> CohortResult<bool> {
        Ok(self.get_assignment(user_id, experiment_id)?.is_some())
    }

    pub fn assignments_for_user(&self, user_id: &str) -> CohortResult<Vec<Assignment>> {
        self.storage.assignments_for_user(user_id)
    }

    pub fn active_assignments_for_user(&self, user_id: &str) -> CohortResult<Vec<Assignment>> {
        let mut assignments = self.storage.assignments_for_user(user_id)?;
        assignments.retain(|a| a.is_active);
        Ok(assignments)
    }

    /// Soft-disable an assignment. The row and its decision are kept.
    pub fn deactivate(&self, user_id: &str, experiment_id: u64) -> CohortResult<Assignment> {
        self.set_active(user_id, experiment_id, false)
    }

    pub fn reactivate(&self, user_id: &str, experiment_id: u64) -> CohortResult<Assignment> {
        self.set_active(user_id, experiment_id, true)
    }

    fn set_active(
        &self,
        user_id: &str,
        experiment_id: u64,
        active: bool,
    ) -> CohortResult<Assignment> {
        let mut assignment = self
            .storage
            .find_assignment(user_id, experiment_id)?
            .ok_or_else(|| {
                CohortError::not_found("assignment", format!("{user_id}/{experiment_id}"))
            })?;
        assignment.is_active = active;
        self.storage.update_assignment(&assignment)?;
        info!(user_id, experiment_id, active, "assignment activity changed");
        Ok(assignment)
    }

    fn load_experiment(&self, experiment_id: u64) -> CohortResult<Experiment> {
        self.storage
            .get_experiment(experiment_id)?
            .ok_or_else(|| CohortError::not_found("experiment", experiment_id))
    }

    /// Event writes happen after the decision is committed; a failure here
    /// must not surface as a failed assignment.
    fn emit<F>(&self, write: F)
    where
        F: FnOnce(&EventRecorder) -> CohortResult<Event>,
    {
        if let Some(events) = &self.events {
            if let Err(e) = write(events) {
                warn!(error = %e, "event write failed after committed assignment");
            }
        }
    }
}

/// The hash-based decision for `user_id`, not yet persisted.
pub fn decide(experiment: &Experiment, user_id: &str) -> Assignment {
    let bucket = percentile(user_id, &experiment.name);
    let (cohort_type, hash) = if included(bucket, experiment.traffic_percentage) {
        let hash = cohort_hash(user_id, &experiment.name);
        let cohort = if hash % 2 == 0 {
            CohortType::Control
        } else {
            CohortType::Treatment
        };
        (cohort, Some(hash))
    } else {
        (CohortType::Excluded, None)
    };

    let mut assignment = Assignment::new(
        user_id,
        experiment.id,
        cohort_type,
        experiment.variant_for(cohort_type),
        AssignmentMethod::HashBased,
    );
    assignment.assignment_hash = hash;
    assignment.environment = experiment.environment.clone();
    assignment
}

fn validate_user_id(user_id: &str) -> CohortResult<()> {
    if user_id.trim().is_empty() {
        return Err(CohortError::validation("user_id", "must not be blank"));
    }
    Ok(())
}

fn already_assigned(user_id: &str, experiment_id: u64) -> CohortError {
    CohortError::conflict(format!(
        "user '{user_id}' is already assigned to experiment {experiment_id}"
    ))
}
