//! v004: events (append-only).

use rusqlite::Connection;

use cohort_core::errors::CohortResult;

use crate::to_storage_err;

pub fn migrate(conn: &Connection) -> CohortResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT NOT NULL,
            event_type    TEXT NOT NULL,
            event_name    TEXT NOT NULL,
            experiment_id INTEGER,
            flag_id       INTEGER,
            variant_name  TEXT,
            event_value   REAL,
            session_id    TEXT,
            environment   TEXT NOT NULL,
            properties    TEXT NOT NULL DEFAULT '{}',
            timestamp     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id);
        CREATE INDEX IF NOT EXISTS idx_events_experiment ON events(experiment_id);
        CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
        ",
    )
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
