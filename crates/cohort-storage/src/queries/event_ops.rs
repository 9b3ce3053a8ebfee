//! Append-only event writes and simple lookups.

use rusqlite::{params, Connection};

use cohort_core::errors::{CohortResult, StorageError};
use cohort_core::models::{Event, EventType};

use super::{enum_col, ts};
use crate::to_storage_err;

const SELECT_COLUMNS: &str = "SELECT id, user_id, event_type, event_name, experiment_id, flag_id,
        variant_name, event_value, session_id, environment, properties, timestamp
    FROM events";

pub fn insert_event(conn: &Connection, event: &Event) -> CohortResult<Event> {
    let properties = serde_json::to_string(&event.properties).map_err(|e| {
        StorageError::Serialization {
            message: e.to_string(),
        }
    })?;
    conn.execute(
        "INSERT INTO events (
            user_id, event_type, event_name, experiment_id, flag_id, variant_name,
            event_value, session_id, environment, properties, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            event.user_id,
            event.event_type.as_str(),
            event.event_name,
            event.experiment_id.map(|id| id as i64),
            event.flag_id.map(|id| id as i64),
            event.variant_name,
            event.event_value,
            event.session_id,
            event.environment,
            properties,
            event.timestamp.to_rfc3339(),
        ],
    )
    .map_err(|e| to_storage_err(e.to_string()))?;

    let mut stored = event.clone();
    stored.id = conn.last_insert_rowid() as u64;
    Ok(stored)
}

pub fn for_user(conn: &Connection, user_id: &str) -> CohortResult<Vec<Event>> {
    query(conn, "WHERE user_id = ?1 ORDER BY id", user_id.to_string())
}

pub fn for_experiment(conn: &Connection, experiment_id: u64) -> CohortResult<Vec<Event>> {
    query(conn, "WHERE experiment_id = ?1 ORDER BY id", experiment_id as i64)
}

fn query<P: rusqlite::ToSql>(conn: &Connection, clause: &str, param: P) -> CohortResult<Vec<Event>> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_COLUMNS} {clause}"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![param], row_to_event)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let properties: String = row.get(10)?;
    Ok(Event {
        id: row.get::<_, i64>(0)? as u64,
        user_id: row.get(1)?,
        event_type: enum_col(row, 2, EventType::parse)?,
        event_name: row.get(3)?,
        experiment_id: row.get::<_, Option<i64>>(4)?.map(|id| id as u64),
        flag_id: row.get::<_, Option<i64>>(5)?.map(|id| id as u64),
        variant_name: row.get(6)?,
        event_value: row.get(7)?,
        session_id: row.get(8)?,
        environment: row.get(9)?,
        properties: serde_json::from_str(&properties).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?,
        timestamp: ts(row, 11)?,
    })
}
