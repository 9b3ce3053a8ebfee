//! StorageEngine: owns the ConnectionPool, runs migrations at startup and
//! implements every Store trait on SQLite.

use std::path::Path;

use chrono::{DateTime, Utc};

use cohort_core::config::StorageConfig;
use cohort_core::errors::CohortResult;
use cohort_core::models::{
    Assignment, Event, Experiment, ExperimentStatus, FeatureFlag, FlagStatus, InsertOutcome,
};
use cohort_core::traits::{IEventStorage, IExperimentStorage, IFlagStorage};

use crate::migrations;
use crate::pool::ConnectionPool;
use crate::queries::{assignment_ops, event_ops, experiment_ops, flag_ops};
use crate::to_storage_err;

/// The SQLite storage engine.
pub struct StorageEngine {
    pool: ConnectionPool,
}

impl StorageEngine {
    /// Open a storage engine backed by a file on disk with default settings.
    pub fn open(path: &Path) -> CohortResult<Self> {
        Self::open_with_config(path, &StorageConfig::default())
    }

    /// Open the database at `config.db_path`.
    pub fn from_config(config: &StorageConfig) -> CohortResult<Self> {
        Self::open_with_config(Path::new(&config.db_path), config)
    }

    /// Open a file-backed engine using pool size and timeouts from `config`.
    pub fn open_with_config(path: &Path, config: &StorageConfig) -> CohortResult<Self> {
        let engine = Self {
            pool: ConnectionPool::open(path, config)?,
        };
        engine.initialize()?;
        tracing::info!(
            path = %path.display(),
            readers = engine.pool.readers.as_ref().map_or(0, |r| r.size()),
            "storage engine opened"
        );
        Ok(engine)
    }

    /// Open an in-memory storage engine (for testing).
    pub fn open_in_memory() -> CohortResult<Self> {
        let engine = Self {
            pool: ConnectionPool::open_in_memory()?,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Run migrations on the writer.
    fn initialize(&self) -> CohortResult<()> {
        self.pool.writer.with_conn_sync(|conn| {
            migrations::run_migrations(conn)?;
            Ok(())
        })
    }

    /// Get a reference to the connection pool (for advanced operations).
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn with_reader<F, T>(&self, f: F) -> CohortResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> CohortResult<T>,
    {
        self.pool.with_reader(f)
    }
}

impl IExperimentStorage for StorageEngine {
    fn create_experiment(&self, experiment: &Experiment) -> CohortResult<Experiment> {
        self.pool
            .writer
            .with_conn_sync(|conn| experiment_ops::insert_experiment(conn, experiment))
    }

    fn get_experiment(&self, id: u64) -> CohortResult<Option<Experiment>> {
        self.with_reader(|conn| experiment_ops::get_experiment(conn, id))
    }

    fn get_experiment_by_name(&self, name: &str) -> CohortResult<Option<Experiment>> {
        self.with_reader(|conn| experiment_ops::get_experiment_by_name(conn, name))
    }

    fn save_experiment(
        &self,
        experiment: &Experiment,
        expected_status: ExperimentStatus,
    ) -> CohortResult<Experiment> {
        self.pool.writer.with_conn_sync(|conn| {
            experiment_ops::update_experiment(conn, experiment, expected_status)
        })
    }

    fn list_experiments_by_status(
        &self,
        status: ExperimentStatus,
    ) -> CohortResult<Vec<Experiment>> {
        self.with_reader(|conn| experiment_ops::list_by_status(conn, status))
    }

    fn increment_sample_size(&self, experiment_id: u64) -> CohortResult<()> {
        self.pool
            .writer
            .with_conn_sync(|conn| experiment_ops::increment_sample_size(conn, experiment_id))
    }

    fn find_assignment(
        &self,
        user_id: &str,
        experiment_id: u64,
    ) -> CohortResult<Option<Assignment>> {
        self.with_reader(|conn| assignment_ops::find(conn, user_id, experiment_id))
    }

    fn insert_assignment_if_absent(&self, assignment: &Assignment) -> CohortResult<InsertOutcome> {
        self.pool
            .writer
            .with_conn_sync(|conn| assignment_ops::insert_if_absent(conn, assignment))
    }

    /// Row and counter commit together or not at all.
    fn insert_assignment_counted(&self, assignment: &Assignment) -> CohortResult<InsertOutcome> {
        self.pool.writer.with_conn_sync(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| to_storage_err(format!("insert_assignment begin: {e}")))?;

            let outcome = assignment_ops::insert_if_absent(&tx, assignment)?;
            if let InsertOutcome::Inserted(ref stored) = outcome {
                if stored.cohort_type.is_participant() {
                    experiment_ops::increment_sample_size(&tx, stored.experiment_id)?;
                }
            }

            tx.commit()
                .map_err(|e| to_storage_err(format!("insert_assignment commit: {e}")))?;
            Ok(outcome)
        })
    }

    fn update_assignment(&self, assignment: &Assignment) -> CohortResult<()> {
        self.pool
            .writer
            .with_conn_sync(|conn| assignment_ops::update(conn, assignment))
    }

    fn record_exposure(
        &self,
        user_id: &str,
        experiment_id: u64,
        at: DateTime<Utc>,
    ) -> CohortResult<Assignment> {
        self.pool
            .writer
            .with_conn_sync(|conn| assignment_ops::record_exposure(conn, user_id, experiment_id, at))
    }

    fn assignments_for_user(&self, user_id: &str) -> CohortResult<Vec<Assignment>> {
        self.with_reader(|conn| assignment_ops::for_user(conn, user_id))
    }

    fn count_assignments(&self, experiment_id: u64) -> CohortResult<u64> {
        self.with_reader(|conn| assignment_ops::count_for_experiment(conn, experiment_id))
    }
}

impl IFlagStorage for StorageEngine {
    fn create_flag(&self, flag: &FeatureFlag) -> CohortResult<FeatureFlag> {
        self.pool
            .writer
            .with_conn_sync(|conn| flag_ops::insert_flag(conn, flag))
    }

    fn get_flag(&self, id: u64) -> CohortResult<Option<FeatureFlag>> {
        self.with_reader(|conn| flag_ops::get_flag(conn, id))
    }

    fn get_flag_by_name(
        &self,
        name: &str,
        environment: &str,
    ) -> CohortResult<Option<FeatureFlag>> {
        self.with_reader(|conn| flag_ops::get_flag_by_name(conn, name, environment))
    }

    fn save_flag(&self, flag: &FeatureFlag, expected_status: FlagStatus) -> CohortResult<FeatureFlag> {
        self.pool
            .writer
            .with_conn_sync(|conn| flag_ops::update_flag(conn, flag, expected_status))
    }

    fn list_flags_by_environment(&self, environment: &str) -> CohortResult<Vec<FeatureFlag>> {
        self.with_reader(|conn| flag_ops::list_by_environment(conn, environment))
    }
}

impl IEventStorage for StorageEngine {
    fn append_event(&self, event: &Event) -> CohortResult<Event> {
        self.pool
            .writer
            .with_conn_sync(|conn| event_ops::insert_event(conn, event))
    }

    fn events_for_user(&self, user_id: &str) -> CohortResult<Vec<Event>> {
        self.with_reader(|conn| event_ops::for_user(conn, user_id))
    }

    fn events_for_experiment(&self, experiment_id: u64) -> CohortResult<Vec<Event>> {
        self.with_reader(|conn| event_ops::for_experiment(conn, experiment_id))
    }
}
