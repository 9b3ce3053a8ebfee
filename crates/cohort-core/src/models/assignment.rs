use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of an assignment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CohortType {
    Control,
    Treatment,
    Excluded,
}

impl CohortType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Control => "CONTROL",
            Self::Treatment => "TREATMENT",
            Self::Excluded => "EXCLUDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONTROL" => Some(Self::Control),
            "TREATMENT" => Some(Self::Treatment),
            "EXCLUDED" => Some(Self::Excluded),
            _ => None,
        }
    }

    /// Participants count toward the sample size; excluded users do not.
    pub fn is_participant(self) -> bool {
        !matches!(self, Self::Excluded)
    }
}

impl fmt::Display for CohortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an assignment decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentMethod {
    HashBased,
    Random,
    Manual,
    AttributeBased,
    PercentageBased,
}

impl AssignmentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HashBased => "HASH_BASED",
            Self::Random => "RANDOM",
            Self::Manual => "MANUAL",
            Self::AttributeBased => "ATTRIBUTE_BASED",
            Self::PercentageBased => "PERCENTAGE_BASED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HASH_BASED" => Some(Self::HashBased),
            "RANDOM" => Some(Self::Random),
            "MANUAL" => Some(Self::Manual),
            "ATTRIBUTE_BASED" => Some(Self::AttributeBased),
            "PERCENTAGE_BASED" => Some(Self::PercentageBased),
            _ => None,
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable record of which variant (or exclusion) a user received.
///
/// At most one row exists per `(user_id, experiment_id)`. Rows are never
/// deleted; `is_active` carries soft state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Store-assigned identifier. Zero until persisted.
    pub id: u64,
    pub user_id: String,
    pub experiment_id: u64,
    pub cohort_type: CohortType,
    pub variant_name: String,
    pub assignment_method: AssignmentMethod,
    /// Parity hash behind a HASH_BASED arm decision.
    pub assignment_hash: Option<u64>,
    pub session_id: Option<String>,
    pub environment: String,
    pub assigned_at: DateTime<Utc>,
    pub first_exposure_at: Option<DateTime<Utc>>,
    pub last_exposure_at: Option<DateTime<Utc>>,
    pub exposure_count: u64,
    pub is_active: bool,
}

impl Assignment {
    pub fn new(
        user_id: impl Into<String>,
        experiment_id: u64,
        cohort_type: CohortType,
        variant_name: impl Into<String>,
        assignment_method: AssignmentMethod,
    ) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            experiment_id,
            cohort_type,
            variant_name: variant_name.into(),
            assignment_method,
            assignment_hash: None,
            session_id: None,
            environment: crate::constants::DEFAULT_ENVIRONMENT.to_string(),
            assigned_at: Utc::now(),
            first_exposure_at: None,
            last_exposure_at: None,
            exposure_count: 0,
            is_active: true,
        }
    }

    /// Stamp an exposure: first time only for `first_exposure_at`, always for the rest.
    pub fn record_exposure(&mut self, at: DateTime<Utc>) {
        if self.first_exposure_at.is_none() {
            self.first_exposure_at = Some(at);
        }
        self.last_exposure_at = Some(at);
        self.exposure_count += 1;
    }

    pub fn is_control(&self) -> bool {
        self.cohort_type == CohortType::Control
    }

    pub fn is_treatment(&self) -> bool {
        self.cohort_type == CohortType::Treatment
    }

    pub fn is_excluded(&self) -> bool {
        self.cohort_type == CohortType::Excluded
    }

    pub fn has_been_exposed(&self) -> bool {
        self.exposure_count > 0
    }
}

/// Result of a compare-and-insert keyed on `(user_id, experiment_id)`.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// This call wrote the row.
    Inserted(Assignment),
    /// A row already existed (possibly written by a concurrent caller).
    Existing(Assignment),
}

impl InsertOutcome {
    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn into_assignment(self) -> Assignment {
        match self {
            Self::Inserted(a) | Self::Existing(a) => a,
        }
    }
}
