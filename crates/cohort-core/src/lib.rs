//! # cohort-core
//!
//! Foundation crate for the Cohort experiment platform.
//! Defines the models, Store traits, errors, config, constants and tracing
//! setup shared by the storage and engine crates.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod tracing_setup;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::CohortConfig;
pub use errors::{CohortError, CohortResult};
pub use models::{
    Assignment, AssignmentMethod, CohortType, Event, EventType, Experiment, ExperimentStatus,
    FeatureFlag, FlagStatus,
};
