//! v002: assignments, one row per (user_id, experiment_id).

use rusqlite::Connection;

use cohort_core::errors::CohortResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> CohortResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS assignments (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id           TEXT NOT NULL,
            experiment_id     INTEGER NOT NULL REFERENCES experiments(id),
            cohort_type       TEXT NOT NULL,
            variant_name      TEXT NOT NULL,
            assignment_method TEXT NOT NULL,
            assignment_hash   INTEGER,
            session_id        TEXT,
            environment       TEXT NOT NULL,
            assigned_at       TEXT NOT NULL,
            first_exposure_at TEXT,
            last_exposure_at  TEXT,
            exposure_count    INTEGER NOT NULL DEFAULT 0 CHECK (exposure_count >= 0),
            is_active         INTEGER NOT NULL DEFAULT 1,
            UNIQUE (user_id, experiment_id)
        );

        CREATE INDEX IF NOT EXISTS idx_assignments_user ON assignments(user_id);
        CREATE INDEX IF NOT EXISTS idx_assignments_experiment ON assignments(experiment_id);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
