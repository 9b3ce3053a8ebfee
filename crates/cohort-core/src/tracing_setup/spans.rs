//! Span definitions per operation: assignment, exposure, lifecycle, flag.

/// Create an assignment span.
#[macro_export]
macro_rules! assignment_span {
    ($user_id:expr, $experiment_id:expr) => {
        ::tracing::info_span!(
            "cohort.assignment",
            user_id = %$user_id,
            experiment_id = $experiment_id
        )
    };
}

/// Create an exposure span.
#[macro_export]
macro_rules! exposure_span {
    ($user_id:expr, $experiment_id:expr) => {
        ::tracing::debug_span!(
            "cohort.exposure",
            user_id = %$user_id,
            experiment_id = $experiment_id
        )
    };
}

/// Create a lifecycle transition span.
#[macro_export]
macro_rules! lifecycle_span {
    ($operation:expr, $experiment_id:expr) => {
        ::tracing::info_span!(
            "cohort.lifecycle",
            operation = $operation,
            experiment_id = $experiment_id
        )
    };
}

/// Create a flag mutation span.
#[macro_export]
macro_rules! flag_span {
    ($operation:expr, $flag_id:expr) => {
        ::tracing::info_span!("cohort.flag", operation = $operation, flag_id = $flag_id)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const ASSIGNMENT: &str = "cohort.assignment";
    pub const EXPOSURE: &str = "cohort.exposure";
    pub const LIFECYCLE: &str = "cohort.lifecycle";
    pub const FLAG: &str = "cohort.flag";
}
