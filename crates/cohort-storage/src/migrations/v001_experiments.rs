//! v001: experiments.

use rusqlite::Connection;

use cohort_core::errors::CohortResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> CohortResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS experiments (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            name                 TEXT NOT NULL UNIQUE,
            description          TEXT,
            hypothesis           TEXT,
            status               TEXT NOT NULL DEFAULT 'DRAFT',
            traffic_percentage   INTEGER NOT NULL CHECK (traffic_percentage BETWEEN 1 AND 100),
            control_variant_name TEXT NOT NULL,
            test_variant_name    TEXT NOT NULL,
            environment          TEXT NOT NULL DEFAULT 'development',
            success_metric       TEXT,
            expected_improvement REAL,
            confidence_level     REAL NOT NULL DEFAULT 95.0,
            minimum_sample_size  INTEGER,
            current_sample_size  INTEGER NOT NULL DEFAULT 0 CHECK (current_sample_size >= 0),
            start_date           TEXT,
            end_date             TEXT,
            created_by           TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL,
            CHECK (control_variant_name <> test_variant_name)
        );

        CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiments(status);
        CREATE INDEX IF NOT EXISTS idx_experiments_environment ON experiments(environment);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
