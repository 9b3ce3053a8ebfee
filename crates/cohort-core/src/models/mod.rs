//! Persisted entities. Relationships are plain identifiers.

pub mod assignment;
pub mod event;
pub mod experiment;
pub mod feature_flag;

pub use assignment::{Assignment, AssignmentMethod, CohortType, InsertOutcome};
pub use event::{Event, EventType};
pub use experiment::{Experiment, ExperimentStatus, ExperimentUpdate, NewExperiment};
pub use feature_flag::{FeatureFlag, FlagStatus, FlagUpdate};
