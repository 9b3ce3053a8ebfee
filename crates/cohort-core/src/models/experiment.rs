use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONFIDENCE_LEVEL, DEFAULT_CONTROL_VARIANT, DEFAULT_ENVIRONMENT, DEFAULT_TEST_VARIANT,
};

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Draft,
    Ready,
    Running,
    Paused,
    Completed,
    Archived,
    Cancelled,
}

impl ExperimentStatus {
    pub const ALL: [ExperimentStatus; 7] = [
        Self::Draft,
        Self::Ready,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::Archived,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// RUNNING or PAUSED.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// COMPLETED or ARCHIVED: cancellation is no longer possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured A/B test with two named variants and a traffic percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Store-assigned identifier. Zero until persisted.
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub hypothesis: Option<String>,
    pub status: ExperimentStatus,
    /// Share of users (1–100) that participate at all.
    pub traffic_percentage: u8,
    pub control_variant_name: String,
    pub test_variant_name: String,
    pub environment: String,
    pub success_metric: Option<String>,
    pub expected_improvement: Option<f64>,
    pub confidence_level: f64,
    pub minimum_sample_size: Option<u64>,
    /// Participants assigned to CONTROL or TREATMENT. Only the Store increments it.
    pub current_sample_size: u64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// A DRAFT experiment with default variants, 50% traffic and no id yet.
    pub fn draft(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            description: None,
            hypothesis: None,
            status: ExperimentStatus::Draft,
            traffic_percentage: 50,
            control_variant_name: DEFAULT_CONTROL_VARIANT.to_string(),
            test_variant_name: DEFAULT_TEST_VARIANT.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            success_metric: None,
            expected_improvement: None,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            minimum_sample_size: None,
            current_sample_size: 0,
            start_date: None,
            end_date: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    pub fn can_be_started(&self) -> bool {
        matches!(
            self.status,
            ExperimentStatus::Ready | ExperimentStatus::Paused
        )
    }

    /// Variant name served to the given arm. EXCLUDED users see no variant.
    pub fn variant_for(&self, cohort_type: super::CohortType) -> &str {
        match cohort_type {
            super::CohortType::Control => &self.control_variant_name,
            super::CohortType::Treatment => &self.test_variant_name,
            super::CohortType::Excluded => crate::constants::EXCLUDED_VARIANT_NAME,
        }
    }
}

/// Input for creating an experiment. Validated by the lifecycle before persisting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewExperiment {
    pub name: String,
    pub description: Option<String>,
    pub hypothesis: Option<String>,
    pub traffic_percentage: u8,
    pub control_variant_name: String,
    pub test_variant_name: String,
    pub environment: String,
    pub success_metric: Option<String>,
    pub expected_improvement: Option<f64>,
    pub minimum_sample_size: Option<u64>,
    pub created_by: Option<String>,
}

/// Editable settings of a DRAFT experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentUpdate {
    pub name: String,
    pub description: Option<String>,
    pub hypothesis: Option<String>,
    pub traffic_percentage: u8,
    pub success_metric: Option<String>,
}
