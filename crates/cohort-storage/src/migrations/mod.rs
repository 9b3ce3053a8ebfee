//! Schema migrations, applied in order and recorded in `schema_version`.

mod v001_experiments;
mod v002_assignments;
mod v003_feature_flags;
mod v004_events;

use rusqlite::{params, Connection};

use cohort_core::errors::{CohortResult, StorageError};

use crate::to_storage_err;

type Migration = fn(&Connection) -> CohortResult<()>;

const MIGRATIONS: [(u32, Migration); 4] = [
    (1, v001_experiments::migrate),
    (2, v002_assignments::migrate),
    (3, v003_feature_flags::migrate),
    (4, v004_events::migrate),
];

/// Latest schema version this build knows about.
pub const LATEST_VERSION: u32 = 4;

/// Apply every migration newer than the recorded version.
/// Each migration runs in its own transaction together with its version row.
pub fn run_migrations(conn: &Connection) -> CohortResult<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let current = current_version(conn)?;
    for (version, migrate) in MIGRATIONS {
        if version <= current {
            continue;
        }
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| to_storage_err(format!("migration {version} begin: {e}")))?;
        migrate(&tx).map_err(|e| StorageError::MigrationFailed {
            version,
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![version],
        )
        .map_err(|e| StorageError::MigrationFailed {
            version,
            reason: e.to_string(),
        })?;
        tx.commit()
            .map_err(|e| to_storage_err(format!("migration {version} commit: {e}")))?;
        tracing::debug!(version, "applied migration");
    }
    Ok(LATEST_VERSION)
}

/// Highest applied migration, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> CohortResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err(e.to_string()))
}
