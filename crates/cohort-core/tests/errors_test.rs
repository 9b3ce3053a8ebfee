use cohort_core::errors::*;

#[test]
fn not_found_carries_entity_and_key() {
    let err = CohortError::not_found("experiment", 42);
    let msg = err.to_string();
    assert!(msg.contains("experiment"));
    assert!(msg.contains("42"));
}

#[test]
fn invalid_state_carries_operation_and_status() {
    let err = CohortError::InvalidState {
        entity: "experiment",
        operation: "assign users to",
        status: "DRAFT".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("assign users to"));
    assert!(msg.contains("DRAFT"));
}

#[test]
fn for_operation_relabels_only_invalid_state() {
    let stale = CohortError::invalid_state("experiment", "save", "CANCELLED");
    match stale.for_operation("start") {
        CohortError::InvalidState { entity, operation, status } => {
            assert_eq!((entity, operation, status.as_str()), ("experiment", "start", "CANCELLED"));
        }
        other => panic!("expected InvalidState, got {other}"),
    }

    let missing = CohortError::not_found("experiment", 3).for_operation("start");
    assert!(matches!(missing, CohortError::NotFound { .. }));
}

#[test]
fn validation_carries_field() {
    let err = CohortError::validation("traffic_percentage", "must be between 1 and 100");
    assert!(err.to_string().contains("traffic_percentage"));
}

#[test]
fn storage_error_converts_and_is_retryable() {
    let storage_err = StorageError::Sqlite {
        message: "database is locked".into(),
    };
    let err: CohortError = storage_err.into();
    assert!(matches!(err, CohortError::Storage(_)));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("database is locked"));
}

#[test]
fn domain_errors_are_not_retryable() {
    assert!(!CohortError::conflict("duplicate").is_retryable());
    assert!(!CohortError::not_found("flag", "x").is_retryable());
    assert!(!CohortError::validation("name", "blank").is_retryable());
}

#[test]
fn config_error_converts() {
    let err: CohortError = ConfigError::ValidationFailed {
        field: "storage.read_pool_size".into(),
        message: "too big".into(),
    }
    .into();
    assert!(matches!(err, CohortError::Config(_)));
}
