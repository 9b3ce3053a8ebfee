//! Error handling for Cohort.
//! One error enum per concern, `thiserror` only.

pub mod cohort_error;
pub mod config_error;
pub mod storage_error;

pub use cohort_error::{CohortError, CohortResult};
pub use config_error::ConfigError;
pub use storage_error::StorageError;
