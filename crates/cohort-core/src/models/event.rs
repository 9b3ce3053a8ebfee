use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    FlagExposure,
    FlagEnabled,
    FlagDisabled,
    FlagToggled,
    ExperimentExposure,
    ExperimentAssignment,
    Conversion,
    Purchase,
    Custom,
}

impl EventType {
    pub const ALL: [EventType; 9] = [
        Self::FlagExposure,
        Self::FlagEnabled,
        Self::FlagDisabled,
        Self::FlagToggled,
        Self::ExperimentExposure,
        Self::ExperimentAssignment,
        Self::Conversion,
        Self::Purchase,
        Self::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlagExposure => "FLAG_EXPOSURE",
            Self::FlagEnabled => "FLAG_ENABLED",
            Self::FlagDisabled => "FLAG_DISABLED",
            Self::FlagToggled => "FLAG_TOGGLED",
            Self::ExperimentExposure => "EXPERIMENT_EXPOSURE",
            Self::ExperimentAssignment => "EXPERIMENT_ASSIGNMENT",
            Self::Conversion => "CONVERSION",
            Self::Purchase => "PURCHASE",
            Self::Custom => "CUSTOM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only fact record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub user_id: String,
    pub event_type: EventType,
    pub event_name: String,
    pub experiment_id: Option<u64>,
    pub flag_id: Option<u64>,
    pub variant_name: Option<String>,
    pub event_value: Option<f64>,
    pub session_id: Option<String>,
    pub environment: String,
    pub properties: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(user_id: impl Into<String>, event_type: EventType, environment: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            event_type,
            event_name: event_type.as_str().to_ascii_lowercase(),
            experiment_id: None,
            flag_id: None,
            variant_name: None,
            event_value: None,
            session_id: None,
            environment: environment.into(),
            properties: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }
}
