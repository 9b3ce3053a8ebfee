//! Assignment compare-and-insert, lookup and soft-state updates.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::models::{Assignment, AssignmentMethod, CohortType, InsertOutcome};

use super::{enum_col, ts, ts_opt};
use crate::{is_constraint_violation, to_storage_err};

const SELECT_COLUMNS: &str = "SELECT id, user_id, experiment_id, cohort_type, variant_name,
        assignment_method, assignment_hash, session_id, environment, assigned_at,
        first_exposure_at, last_exposure_at, exposure_count, is_active
    FROM assignments";

/// Insert unless a row for `(user_id, experiment_id)` exists.
///
/// `ON CONFLICT DO NOTHING` against the UNIQUE constraint makes the check and
/// the write one statement, so a concurrent writer in another process can
/// never produce a second row. The loser re-reads and gets the winner's row.
pub fn insert_if_absent(conn: &Connection, assignment: &Assignment) -> CohortResult<InsertOutcome> {
    let changed = conn
        .execute(
            "INSERT INTO assignments (
                user_id, experiment_id, cohort_type, variant_name, assignment_method,
                assignment_hash, session_id, environment, assigned_at, first_exposure_at,
                last_exposure_at, exposure_count, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT (user_id, experiment_id) DO NOTHING",
            params![
                assignment.user_id,
                assignment.experiment_id as i64,
                assignment.cohort_type.as_str(),
                assignment.variant_name,
                assignment.assignment_method.as_str(),
                assignment.assignment_hash.map(|h| h as i64),
                assignment.session_id,
                assignment.environment,
                assignment.assigned_at.to_rfc3339(),
                assignment.first_exposure_at.map(|t| t.to_rfc3339()),
                assignment.last_exposure_at.map(|t| t.to_rfc3339()),
                assignment.exposure_count as i64,
                assignment.is_active,
            ],
        )
        .map_err(|e| {
            // Uniqueness is absorbed by DO NOTHING; what remains is the foreign key.
            if is_constraint_violation(&e) {
                CohortError::not_found("experiment", assignment.experiment_id)
            } else {
                to_storage_err(format!("insert assignment: {e}"))
            }
        })?;

    if changed == 1 {
        let mut stored = assignment.clone();
        stored.id = conn.last_insert_rowid() as u64;
        return Ok(InsertOutcome::Inserted(stored));
    }

    let existing = find(conn, &assignment.user_id, assignment.experiment_id)?.ok_or_else(|| {
        to_storage_err(format!(
            "assignment for user '{}' in experiment {} conflicted but could not be re-read",
            assignment.user_id, assignment.experiment_id
        ))
    })?;
    Ok(InsertOutcome::Existing(existing))
}

pub fn find(conn: &Connection, user_id: &str, experiment_id: u64) -> CohortResult<Option<Assignment>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND experiment_id = ?2"),
        params![user_id, experiment_id as i64],
        row_to_assignment,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn for_user(conn: &Connection, user_id: &str) -> CohortResult<Vec<Assignment>> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY id"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![user_id], row_to_assignment)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn count_for_experiment(conn: &Connection, experiment_id: u64) -> CohortResult<u64> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM assignments WHERE experiment_id = ?1",
            params![experiment_id as i64],
            |row| row.get(0),
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(count as u64)
}

/// Overwrite exposure state and `is_active`. The decision columns are immutable.
pub fn update(conn: &Connection, assignment: &Assignment) -> CohortResult<()> {
    let changed = conn
        .execute(
            "UPDATE assignments SET
                first_exposure_at = ?3, last_exposure_at = ?4, exposure_count = ?5, is_active = ?6
             WHERE user_id = ?1 AND experiment_id = ?2",
            params![
                assignment.user_id,
                assignment.experiment_id as i64,
                assignment.first_exposure_at.map(|t| t.to_rfc3339()),
                assignment.last_exposure_at.map(|t| t.to_rfc3339()),
                assignment.exposure_count as i64,
                assignment.is_active,
            ],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(CohortError::not_found(
            "assignment",
            format!("{}/{}", assignment.user_id, assignment.experiment_id),
        ));
    }
    Ok(())
}

/// Exposure stamp evaluated inside SQLite, so concurrent exposures never lose a count.
pub fn record_exposure(
    conn: &Connection,
    user_id: &str,
    experiment_id: u64,
    at: DateTime<Utc>,
) -> CohortResult<Assignment> {
    let stamp = at.to_rfc3339();
    let changed = conn
        .execute(
            "UPDATE assignments SET
                first_exposure_at = COALESCE(first_exposure_at, ?3),
                last_exposure_at = ?3,
                exposure_count = exposure_count + 1
             WHERE user_id = ?1 AND experiment_id = ?2",
            params![user_id, experiment_id as i64, stamp],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(CohortError::not_found(
            "assignment",
            format!("{user_id}/{experiment_id}"),
        ));
    }
    find(conn, user_id, experiment_id)?.ok_or_else(|| {
        CohortError::not_found("assignment", format!("{user_id}/{experiment_id}"))
    })
}

fn row_to_assignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get::<_, i64>(0)? as u64,
        user_id: row.get(1)?,
        experiment_id: row.get::<_, i64>(2)? as u64,
        cohort_type: enum_col(row, 3, CohortType::parse)?,
        variant_name: row.get(4)?,
        assignment_method: enum_col(row, 5, AssignmentMethod::parse)?,
        assignment_hash: row.get::<_, Option<i64>>(6)?.map(|h| h as u64),
        session_id: row.get(7)?,
        environment: row.get(8)?,
        assigned_at: ts(row, 9)?,
        first_exposure_at: ts_opt(row, 10)?,
        last_exposure_at: ts_opt(row, 11)?,
        exposure_count: row.get::<_, i64>(12)? as u64,
        is_active: row.get(13)?,
    })
}
