use super::{ConfigError, StorageError};

/// Top-level error for every Cohort operation.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// A referenced experiment, flag or assignment does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The operation is illegal in the entity's current lifecycle state.
    #[error("cannot {operation} {entity} in status {status}")]
    InvalidState {
        entity: &'static str,
        operation: &'static str,
        status: String,
    },

    /// A one-shot write collided with an existing record.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Malformed input, rejected before any mutation.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CohortError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        operation: &'static str,
        status: impl ToString,
    ) -> Self {
        Self::InvalidState {
            entity,
            operation,
            status: status.to_string(),
        }
    }

    /// Re-label an `InvalidState` raised by a lower layer with the
    /// caller's operation. Other variants pass through.
    pub fn for_operation(self, operation: &'static str) -> Self {
        match self {
            Self::InvalidState { entity, status, .. } => Self::InvalidState {
                entity,
                operation,
                status,
            },
            other => other,
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Only persistence failures are worth a caller-side retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type CohortResult<T> = Result<T, CohortError>;
