//! Feature flag CRUD.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::models::{FeatureFlag, FlagStatus};

use super::{enum_col, ts};
use crate::{is_unique_violation, to_storage_err};

const SELECT_COLUMNS: &str = "SELECT id, name, description, enabled, status, environment,
        rollout_percentage, created_by, created_at, updated_at
    FROM feature_flags";

pub fn insert_flag(conn: &Connection, flag: &FeatureFlag) -> CohortResult<FeatureFlag> {
    conn.execute(
        "INSERT INTO feature_flags (
            name, description, enabled, status, environment, rollout_percentage,
            created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            flag.name,
            flag.description,
            flag.enabled,
            flag.status.as_str(),
            flag.environment,
            flag.rollout_percentage,
            flag.created_by,
            flag.created_at.to_rfc3339(),
            flag.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            CohortError::conflict(format!(
                "flag '{}' already exists in environment '{}'",
                flag.name, flag.environment
            ))
        } else {
            to_storage_err(e.to_string())
        }
    })?;

    let mut stored = flag.clone();
    stored.id = conn.last_insert_rowid() as u64;
    Ok(stored)
}

pub fn get_flag(conn: &Connection, id: u64) -> CohortResult<Option<FeatureFlag>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id as i64],
        row_to_flag,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn get_flag_by_name(
    conn: &Connection,
    name: &str,
    environment: &str,
) -> CohortResult<Option<FeatureFlag>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE name = ?1 AND environment = ?2"),
        params![name, environment],
        row_to_flag,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn list_by_environment(conn: &Connection, environment: &str) -> CohortResult<Vec<FeatureFlag>> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_COLUMNS} WHERE environment = ?1 ORDER BY name"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![environment], row_to_flag)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Overwrite the flag while its stored status is still `expected_status`.
pub fn update_flag(
    conn: &Connection,
    flag: &FeatureFlag,
    expected_status: FlagStatus,
) -> CohortResult<FeatureFlag> {
    let now = Utc::now();
    let changed = conn
        .execute(
            "UPDATE feature_flags SET
                name = ?2, description = ?3, enabled = ?4, status = ?5, environment = ?6,
                rollout_percentage = ?7, updated_at = ?8
             WHERE id = ?1 AND status = ?9",
            params![
                flag.id as i64,
                flag.name,
                flag.description,
                flag.enabled,
                flag.status.as_str(),
                flag.environment,
                flag.rollout_percentage,
                now.to_rfc3339(),
                expected_status.as_str(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                CohortError::conflict(format!(
                    "flag '{}' already exists in environment '{}'",
                    flag.name, flag.environment
                ))
            } else {
                to_storage_err(e.to_string())
            }
        })?;
    if changed == 0 {
        return match get_flag(conn, flag.id)? {
            Some(current) => Err(CohortError::invalid_state("flag", "save", current.status)),
            None => Err(CohortError::not_found("flag", flag.id)),
        };
    }
    let mut stored = flag.clone();
    stored.updated_at = now;
    Ok(stored)
}

fn row_to_flag(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeatureFlag> {
    Ok(FeatureFlag {
        id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        description: row.get(2)?,
        enabled: row.get(3)?,
        status: enum_col(row, 4, FlagStatus::parse)?,
        environment: row.get(5)?,
        rollout_percentage: row.get(6)?,
        created_by: row.get(7)?,
        created_at: ts(row, 8)?,
        updated_at: ts(row, 9)?,
    })
}
