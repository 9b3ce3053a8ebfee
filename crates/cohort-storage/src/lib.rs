//! # cohort-storage
//!
//! Store implementations for the Cohort engine:
//! - [`StorageEngine`]: SQLite with a single writer, a read pool and migrations.
//! - [`MemoryStorage`]: lock-sharded in-process maps, for tests and embedding.
//!
//! Both provide the atomic compare-and-insert and sample-size increment the
//! assignment engine depends on.

pub mod engine;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use engine::StorageEngine;
pub use memory::MemoryStorage;

use cohort_core::errors::{CohortError, StorageError};

/// Wrap a message as a storage-layer error.
pub(crate) fn to_storage_err(message: impl Into<String>) -> CohortError {
    CohortError::Storage(StorageError::Sqlite {
        message: message.into(),
    })
}

/// True when SQLite rejected a write because of a UNIQUE/constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// True when the violated constraint is a UNIQUE index.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
