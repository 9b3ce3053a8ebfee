//! Experiment CRUD and the atomic sample-size increment.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use cohort_core::errors::{CohortError, CohortResult};
use cohort_core::models::{Experiment, ExperimentStatus};

use super::{enum_col, ts, ts_opt};
use crate::{is_unique_violation, to_storage_err};

const SELECT_COLUMNS: &str = "SELECT id, name, description, hypothesis, status, traffic_percentage,
        control_variant_name, test_variant_name, environment, success_metric,
        expected_improvement, confidence_level, minimum_sample_size, current_sample_size,
        start_date, end_date, created_by, created_at, updated_at
    FROM experiments";

/// Insert an experiment and return it with its new id.
pub fn insert_experiment(conn: &Connection, experiment: &Experiment) -> CohortResult<Experiment> {
    conn.execute(
        "INSERT INTO experiments (
            name, description, hypothesis, status, traffic_percentage,
            control_variant_name, test_variant_name, environment, success_metric,
            expected_improvement, confidence_level, minimum_sample_size, current_sample_size,
            start_date, end_date, created_by, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            experiment.name,
            experiment.description,
            experiment.hypothesis,
            experiment.status.as_str(),
            experiment.traffic_percentage,
            experiment.control_variant_name,
            experiment.test_variant_name,
            experiment.environment,
            experiment.success_metric,
            experiment.expected_improvement,
            experiment.confidence_level,
            experiment.minimum_sample_size.map(|n| n as i64),
            experiment.current_sample_size as i64,
            experiment.start_date.map(|t| t.to_rfc3339()),
            experiment.end_date.map(|t| t.to_rfc3339()),
            experiment.created_by,
            experiment.created_at.to_rfc3339(),
            experiment.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            CohortError::conflict(format!("experiment '{}' already exists", experiment.name))
        } else {
            to_storage_err(e.to_string())
        }
    })?;

    let mut stored = experiment.clone();
    stored.id = conn.last_insert_rowid() as u64;
    Ok(stored)
}

pub fn get_experiment(conn: &Connection, id: u64) -> CohortResult<Option<Experiment>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id as i64],
        row_to_experiment,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn get_experiment_by_name(conn: &Connection, name: &str) -> CohortResult<Option<Experiment>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE name = ?1"),
        params![name],
        row_to_experiment,
    )
    .optional()
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn list_by_status(conn: &Connection, status: ExperimentStatus) -> CohortResult<Vec<Experiment>> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY id"))
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![status.as_str()], row_to_experiment)
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Overwrite everything except `current_sample_size` while the row is still in
/// `expected_status`, then return the stored row.
pub fn update_experiment(
    conn: &Connection,
    experiment: &Experiment,
    expected_status: ExperimentStatus,
) -> CohortResult<Experiment> {
    let changed = conn
        .execute(
            "UPDATE experiments SET
                name = ?2, description = ?3, hypothesis = ?4, status = ?5,
                traffic_percentage = ?6, control_variant_name = ?7, test_variant_name = ?8,
                environment = ?9, success_metric = ?10, expected_improvement = ?11,
                confidence_level = ?12, minimum_sample_size = ?13, start_date = ?14,
                end_date = ?15, created_by = ?16, updated_at = ?17
             WHERE id = ?1 AND status = ?18",
            params![
                experiment.id as i64,
                experiment.name,
                experiment.description,
                experiment.hypothesis,
                experiment.status.as_str(),
                experiment.traffic_percentage,
                experiment.control_variant_name,
                experiment.test_variant_name,
                experiment.environment,
                experiment.success_metric,
                experiment.expected_improvement,
                experiment.confidence_level,
                experiment.minimum_sample_size.map(|n| n as i64),
                experiment.start_date.map(|t| t.to_rfc3339()),
                experiment.end_date.map(|t| t.to_rfc3339()),
                experiment.created_by,
                Utc::now().to_rfc3339(),
                expected_status.as_str(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                CohortError::conflict(format!("experiment '{}' already exists", experiment.name))
            } else {
                to_storage_err(e.to_string())
            }
        })?;
    if changed == 0 {
        return match get_experiment(conn, experiment.id)? {
            Some(current) => Err(CohortError::invalid_state("experiment", "save", current.status)),
            None => Err(CohortError::not_found("experiment", experiment.id)),
        };
    }
    get_experiment(conn, experiment.id)?
        .ok_or_else(|| CohortError::not_found("experiment", experiment.id))
}

/// `current_sample_size = current_sample_size + 1`, evaluated inside SQLite.
pub fn increment_sample_size(conn: &Connection, experiment_id: u64) -> CohortResult<()> {
    let changed = conn
        .execute(
            "UPDATE experiments
             SET current_sample_size = current_sample_size + 1, updated_at = ?2
             WHERE id = ?1",
            params![experiment_id as i64, Utc::now().to_rfc3339()],
        )
        .map_err(|e| to_storage_err(e.to_string()))?;
    if changed == 0 {
        return Err(CohortError::not_found("experiment", experiment_id));
    }
    Ok(())
}

fn row_to_experiment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        description: row.get(2)?,
        hypothesis: row.get(3)?,
        status: enum_col(row, 4, ExperimentStatus::parse)?,
        traffic_percentage: row.get(5)?,
        control_variant_name: row.get(6)?,
        test_variant_name: row.get(7)?,
        environment: row.get(8)?,
        success_metric: row.get(9)?,
        expected_improvement: row.get(10)?,
        confidence_level: row.get(11)?,
        minimum_sample_size: row.get::<_, Option<i64>>(12)?.map(|n| n as u64),
        current_sample_size: row.get::<_, i64>(13)? as u64,
        start_date: ts_opt(row, 14)?,
        end_date: ts_opt(row, 15)?,
        created_by: row.get(16)?,
        created_at: ts(row, 17)?,
        updated_at: ts(row, 18)?,
    })
}
