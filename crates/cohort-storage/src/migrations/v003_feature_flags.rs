//! v003: feature_flags, unique per (name, environment).

use rusqlite::Connection;

use cohort_core::errors::CohortResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> CohortResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS feature_flags (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            name               TEXT NOT NULL,
            description        TEXT,
            enabled            INTEGER NOT NULL DEFAULT 0,
            status             TEXT NOT NULL DEFAULT 'INACTIVE',
            environment        TEXT NOT NULL,
            rollout_percentage INTEGER NOT NULL DEFAULT 0 CHECK (rollout_percentage BETWEEN 0 AND 100),
            created_by         TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            UNIQUE (name, environment)
        );

        CREATE INDEX IF NOT EXISTS idx_flags_environment ON feature_flags(environment);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
