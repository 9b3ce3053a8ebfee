use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ENVIRONMENT;

/// Assignment engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Environment given to experiments and flags created without one.
    pub default_environment: String,
    /// Emit assignment/exposure events when an event store is attached.
    pub record_events: bool,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
            record_events: true,
        }
    }
}
