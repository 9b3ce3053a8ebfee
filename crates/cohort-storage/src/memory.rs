//! MemoryStorage: every Store trait over sharded `DashMap`s.
//!
//! Atomicity comes from DashMap's per-shard locks: the assignment
//! compare-and-insert holds the entry for its key, and the sample-size
//! increment and status-guarded saves mutate the record in place under its
//! shard lock.
//!
//! Lock order is record map before name index. Nothing holds a name index
//! guard while touching a record map.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::models::{
    Assignment, Event, Experiment, ExperimentStatus, FeatureFlag, FlagStatus, InsertOutcome,
};
use cohort_core::traits::{IEventStorage, IExperimentStorage, IFlagStorage};

type AssignmentKey = (String, u64);

/// Thread-safe in-process store.
#[derive(Default)]
pub struct MemoryStorage {
    experiments: DashMap<u64, Experiment>,
    experiment_names: DashMap<String, u64>,
    assignments: DashMap<AssignmentKey, Assignment>,
    flags: DashMap<u64, FeatureFlag>,
    flag_names: DashMap<(String, String), u64>,
    events: DashMap<u64, Event>,
    next_id: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn bump_sample_size(&self, experiment_id: u64) -> CohortResult<()> {
        let mut experiment = self
            .experiments
            .get_mut(&experiment_id)
            .ok_or_else(|| CohortError::not_found("experiment", experiment_id))?;
        experiment.current_sample_size += 1;
        experiment.updated_at = Utc::now();
        Ok(())
    }

    /// Shared body of the two insert paths. `count` bumps the sample size
    /// while the assignment entry is still held.
    fn insert_assignment(&self, assignment: &Assignment, count: bool) -> CohortResult<InsertOutcome> {
        if !self.experiments.contains_key(&assignment.experiment_id) {
            return Err(CohortError::not_found("experiment", assignment.experiment_id));
        }
        let key = (assignment.user_id.clone(), assignment.experiment_id);
        match self.assignments.entry(key) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                let mut stored = assignment.clone();
                stored.id = self.next_id();
                if count && stored.cohort_type.is_participant() {
                    self.bump_sample_size(stored.experiment_id)?;
                }
                slot.insert(stored.clone());
                Ok(InsertOutcome::Inserted(stored))
            }
        }
    }

    fn sorted<T: Clone>(mut items: Vec<(u64, T)>) -> Vec<T> {
        items.sort_by_key(|(id, _)| *id);
        items.into_iter().map(|(_, item)| item).collect()
    }
}

impl IExperimentStorage for MemoryStorage {
    fn create_experiment(&self, experiment: &Experiment) -> CohortResult<Experiment> {
        match self.experiment_names.entry(experiment.name.clone()) {
            Entry::Occupied(_) => Err(CohortError::conflict(format!(
                "experiment '{}' already exists",
                experiment.name
            ))),
            Entry::Vacant(slot) => {
                let mut stored = experiment.clone();
                stored.id = self.next_id();
                slot.insert(stored.id);
                self.experiments.insert(stored.id, stored.clone());
                Ok(stored)
            }
        }
    }

    fn get_experiment(&self, id: u64) -> CohortResult<Option<Experiment>> {
        Ok(self.experiments.get(&id).map(|e| e.clone()))
    }

    fn get_experiment_by_name(&self, name: &str) -> CohortResult<Option<Experiment>> {
        let id = match self.experiment_names.get(name) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_experiment(id)
    }

    fn save_experiment(
        &self,
        experiment: &Experiment,
        expected_status: ExperimentStatus,
    ) -> CohortResult<Experiment> {
        let mut stored = self
            .experiments
            .get_mut(&experiment.id)
            .ok_or_else(|| CohortError::not_found("experiment", experiment.id))?;
        if stored.status != expected_status {
            return Err(CohortError::invalid_state("experiment", "save", stored.status));
        }

        if stored.name != experiment.name {
            match self.experiment_names.entry(experiment.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(CohortError::conflict(format!(
                        "experiment '{}' already exists",
                        experiment.name
                    )))
                }
                Entry::Vacant(slot) => {
                    slot.insert(experiment.id);
                }
            }
            self.experiment_names.remove(&stored.name);
        }

        let sample_size = stored.current_sample_size;
        *stored = experiment.clone();
        stored.current_sample_size = sample_size;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn list_experiments_by_status(
        &self,
        status: ExperimentStatus,
    ) -> CohortResult<Vec<Experiment>> {
        let matching = self
            .experiments
            .iter()
            .filter(|e| e.status == status)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        Ok(Self::sorted(matching))
    }

    fn increment_sample_size(&self, experiment_id: u64) -> CohortResult<()> {
        self.bump_sample_size(experiment_id)
    }

    fn find_assignment(
        &self,
        user_id: &str,
        experiment_id: u64,
    ) -> CohortResult<Option<Assignment>> {
        Ok(self
            .assignments
            .get(&(user_id.to_string(), experiment_id))
            .map(|a| a.clone()))
    }

    fn insert_assignment_if_absent(&self, assignment: &Assignment) -> CohortResult<InsertOutcome> {
        self.insert_assignment(assignment, false)
    }

    fn insert_assignment_counted(&self, assignment: &Assignment) -> CohortResult<InsertOutcome> {
        self.insert_assignment(assignment, true)
    }

    fn update_assignment(&self, assignment: &Assignment) -> CohortResult<()> {
        let key = (assignment.user_id.clone(), assignment.experiment_id);
        let mut stored = self.assignments.get_mut(&key).ok_or_else(|| {
            CohortError::not_found(
                "assignment",
                format!("{}/{}", assignment.user_id, assignment.experiment_id),
            )
        })?;
        stored.first_exposure_at = assignment.first_exposure_at;
        stored.last_exposure_at = assignment.last_exposure_at;
        stored.exposure_count = assignment.exposure_count;
        stored.is_active = assignment.is_active;
        Ok(())
    }

    fn record_exposure(
        &self,
        user_id: &str,
        experiment_id: u64,
        at: DateTime<Utc>,
    ) -> CohortResult<Assignment> {
        let mut stored = self
            .assignments
            .get_mut(&(user_id.to_string(), experiment_id))
            .ok_or_else(|| {
                CohortError::not_found("assignment", format!("{user_id}/{experiment_id}"))
            })?;
        stored.record_exposure(at);
        Ok(stored.clone())
    }

    fn assignments_for_user(&self, user_id: &str) -> CohortResult<Vec<Assignment>> {
        let matching = self
            .assignments
            .iter()
            .filter(|a| a.key().0 == user_id)
            .map(|a| (a.id, a.value().clone()))
            .collect();
        Ok(Self::sorted(matching))
    }

    fn count_assignments(&self, experiment_id: u64) -> CohortResult<u64> {
        Ok(self
            .assignments
            .iter()
            .filter(|a| a.key().1 == experiment_id)
            .count() as u64)
    }
}

impl IFlagStorage for MemoryStorage {
    fn create_flag(&self, flag: &FeatureFlag) -> CohortResult<FeatureFlag> {
        match self
            .flag_names
            .entry((flag.name.clone(), flag.environment.clone()))
        {
            Entry::Occupied(_) => Err(CohortError::conflict(format!(
                "flag '{}' already exists in environment '{}'",
                flag.name, flag.environment
            ))),
            Entry::Vacant(slot) => {
                let mut stored = flag.clone();
                stored.id = self.next_id();
                slot.insert(stored.id);
                self.flags.insert(stored.id, stored.clone());
                Ok(stored)
            }
        }
    }

    fn get_flag(&self, id: u64) -> CohortResult<Option<FeatureFlag>> {
        Ok(self.flags.get(&id).map(|f| f.clone()))
    }

    fn get_flag_by_name(
        &self,
        name: &str,
        environment: &str,
    ) -> CohortResult<Option<FeatureFlag>> {
        let id = match self
            .flag_names
            .get(&(name.to_string(), environment.to_string()))
        {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_flag(id)
    }

    fn save_flag(&self, flag: &FeatureFlag, expected_status: FlagStatus) -> CohortResult<FeatureFlag> {
        let mut stored = self
            .flags
            .get_mut(&flag.id)
            .ok_or_else(|| CohortError::not_found("flag", flag.id))?;
        if stored.status != expected_status {
            return Err(CohortError::invalid_state("flag", "save", stored.status));
        }

        let previous_key = (stored.name.clone(), stored.environment.clone());
        let new_key = (flag.name.clone(), flag.environment.clone());
        if previous_key != new_key {
            match self.flag_names.entry(new_key) {
                Entry::Occupied(_) => {
                    return Err(CohortError::conflict(format!(
                        "flag '{}' already exists in environment '{}'",
                        flag.name, flag.environment
                    )))
                }
                Entry::Vacant(slot) => {
                    slot.insert(flag.id);
                }
            }
            self.flag_names.remove(&previous_key);
        }

        *stored = flag.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn list_flags_by_environment(&self, environment: &str) -> CohortResult<Vec<FeatureFlag>> {
        let mut flags: Vec<FeatureFlag> = self
            .flags
            .iter()
            .filter(|f| f.environment == environment)
            .map(|f| f.value().clone())
            .collect();
        flags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(flags)
    }
}

impl IEventStorage for MemoryStorage {
    fn append_event(&self, event: &Event) -> CohortResult<Event> {
        let mut stored = event.clone();
        stored.id = self.next_id();
        self.events.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn events_for_user(&self, user_id: &str) -> CohortResult<Vec<Event>> {
        let matching = self
            .events
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        Ok(Self::sorted(matching))
    }

    fn events_for_experiment(&self, experiment_id: u64) -> CohortResult<Vec<Event>> {
        let matching = self
            .events
            .iter()
            .filter(|e| e.experiment_id == Some(experiment_id))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        Ok(Self::sorted(matching))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::models::{AssignmentMethod, CohortType};

    fn stored_experiment(store: &MemoryStorage) -> Experiment {
        store.create_experiment(&Experiment::draft("memory_exp")).unwrap()
    }

    #[test]
    fn counted_insert_bumps_only_participants() {
        let store = MemoryStorage::new();
        let exp = stored_experiment(&store);

        let control = Assignment::new("u1", exp.id, CohortType::Control, "control", AssignmentMethod::HashBased);
        let excluded = Assignment::new("u2", exp.id, CohortType::Excluded, "excluded", AssignmentMethod::HashBased);
        assert!(store.insert_assignment_counted(&control).unwrap().was_inserted());
        assert!(store.insert_assignment_counted(&excluded).unwrap().was_inserted());
        assert!(!store.insert_assignment_counted(&control).unwrap().was_inserted());

        assert_eq!(store.get_experiment(exp.id).unwrap().unwrap().current_sample_size, 1);
        assert_eq!(store.count_assignments(exp.id).unwrap(), 2);
    }

    #[test]
    fn insert_for_unknown_experiment_is_not_found() {
        let store = MemoryStorage::new();
        let a = Assignment::new("u1", 99, CohortType::Control, "control", AssignmentMethod::HashBased);
        let err = store.insert_assignment_if_absent(&a).unwrap_err();
        assert!(matches!(err, CohortError::NotFound { .. }));
    }

    #[test]
    fn save_keeps_store_owned_sample_size() {
        let store = MemoryStorage::new();
        let exp = stored_experiment(&store);
        store.increment_sample_size(exp.id).unwrap();

        let mut stale = exp.clone();
        stale.description = Some("edited".into());
        let saved = store.save_experiment(&stale, ExperimentStatus::Draft).unwrap();
        assert_eq!(saved.current_sample_size, 1);
        assert_eq!(saved.description.as_deref(), Some("edited"));
    }

    #[test]
    fn rename_moves_name_index() {
        let store = MemoryStorage::new();
        let mut exp = stored_experiment(&store);
        exp.name = "renamed".into();
        store.save_experiment(&exp, ExperimentStatus::Draft).unwrap();
        assert!(store.get_experiment_by_name("memory_exp").unwrap().is_none());
        assert_eq!(store.get_experiment_by_name("renamed").unwrap().unwrap().id, exp.id);
    }

    #[test]
    fn stale_status_save_is_rejected_and_keeps_names() {
        let store = MemoryStorage::new();
        let exp = stored_experiment(&store);

        let mut renamed = exp.clone();
        renamed.name = "should_not_stick".into();
        let err = store
            .save_experiment(&renamed, ExperimentStatus::Ready)
            .unwrap_err();
        assert!(matches!(err, CohortError::InvalidState { ref status, .. } if status == "DRAFT"));
        assert!(store.get_experiment_by_name("should_not_stick").unwrap().is_none());
        assert_eq!(store.get_experiment_by_name("memory_exp").unwrap().unwrap().id, exp.id);
    }
}
