use chrono::{DateTime, Utc};

use crate::errors::CohortResult;
use crate::models::{
    Assignment, Experiment, ExperimentStatus, FeatureFlag, FlagStatus, InsertOutcome,
};

/// Experiments and the assignments that reference them.
///
/// The atomic primitives the engine relies on are
/// [`insert_assignment_counted`](Self::insert_assignment_counted),
/// [`increment_sample_size`](Self::increment_sample_size),
/// [`record_exposure`](Self::record_exposure) and the status-guarded
/// [`save_experiment`](Self::save_experiment).
pub trait IExperimentStorage: Send + Sync {
    // --- Experiments ---
    /// Insert a new experiment. Fails with `Conflict` on a duplicate name.
    fn create_experiment(&self, experiment: &Experiment) -> CohortResult<Experiment>;
    fn get_experiment(&self, id: u64) -> CohortResult<Option<Experiment>>;
    fn get_experiment_by_name(&self, name: &str) -> CohortResult<Option<Experiment>>;
    /// Overwrite every field except `current_sample_size`, which only
    /// [`increment_sample_size`](Self::increment_sample_size) may change.
    ///
    /// Compare-and-set on status: the write happens only while the stored
    /// status is still `expected_status`. Otherwise fails with `InvalidState`
    /// carrying the stored status, and nothing is written.
    fn save_experiment(
        &self,
        experiment: &Experiment,
        expected_status: ExperimentStatus,
    ) -> CohortResult<Experiment>;
    fn list_experiments_by_status(&self, status: ExperimentStatus)
        -> CohortResult<Vec<Experiment>>;
    /// Atomic `current_sample_size += 1`.
    fn increment_sample_size(&self, experiment_id: u64) -> CohortResult<()>;

    // --- Assignments ---
    fn find_assignment(&self, user_id: &str, experiment_id: u64)
        -> CohortResult<Option<Assignment>>;
    /// Compare-and-insert keyed on `(user_id, experiment_id)`.
    fn insert_assignment_if_absent(&self, assignment: &Assignment) -> CohortResult<InsertOutcome>;
    /// Insert and, when this call wrote a participant row, bump the sample size.
    ///
    /// Both writes commit together or not at all: a failed increment leaves
    /// no row behind.
    fn insert_assignment_counted(&self, assignment: &Assignment) -> CohortResult<InsertOutcome>;
    /// Overwrite mutable assignment state (exposure, `is_active`).
    fn update_assignment(&self, assignment: &Assignment) -> CohortResult<()>;
    /// Atomic exposure stamp: `first_exposure_at` only if unset, `last_exposure_at`
    /// always, `exposure_count += 1`. Returns the updated row.
    fn record_exposure(
        &self,
        user_id: &str,
        experiment_id: u64,
        at: DateTime<Utc>,
    ) -> CohortResult<Assignment>;
    fn assignments_for_user(&self, user_id: &str) -> CohortResult<Vec<Assignment>>;
    fn count_assignments(&self, experiment_id: u64) -> CohortResult<u64>;
}

/// Feature flags, unique per `(name, environment)`.
pub trait IFlagStorage: Send + Sync {
    fn create_flag(&self, flag: &FeatureFlag) -> CohortResult<FeatureFlag>;
    fn get_flag(&self, id: u64) -> CohortResult<Option<FeatureFlag>>;
    fn get_flag_by_name(&self, name: &str, environment: &str)
        -> CohortResult<Option<FeatureFlag>>;
    /// Compare-and-set on status, like
    /// [`IExperimentStorage::save_experiment`].
    fn save_flag(&self, flag: &FeatureFlag, expected_status: FlagStatus)
        -> CohortResult<FeatureFlag>;
    fn list_flags_by_environment(&self, environment: &str) -> CohortResult<Vec<FeatureFlag>>;
}
