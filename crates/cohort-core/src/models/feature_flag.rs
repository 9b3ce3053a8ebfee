use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagStatus {
    Active,
    Inactive,
    Archived,
    Deprecated,
}

impl FlagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Archived => "ARCHIVED",
            Self::Deprecated => "DEPRECATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "ARCHIVED" => Some(Self::Archived),
            "DEPRECATED" => Some(Self::Deprecated),
            _ => None,
        }
    }
}

impl fmt::Display for FlagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability gate with a gradual rollout percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub id: u64,
    /// Unique per environment.
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub status: FlagStatus,
    pub environment: String,
    /// 0–100. Zero disables the flag for everyone.
    pub rollout_percentage: u8,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    /// A disabled, INACTIVE flag at 0% rollout.
    pub fn new(name: impl Into<String>, environment: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.into(),
            description: None,
            enabled: false,
            status: FlagStatus::Inactive,
            environment: environment.into(),
            rollout_percentage: 0,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enabled and ACTIVE.
    pub fn is_active(&self) -> bool {
        self.enabled && self.status == FlagStatus::Active
    }

    /// Flip `enabled`, moving INACTIVE↔ACTIVE alongside. ARCHIVED and
    /// DEPRECATED keep their status.
    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
        if self.enabled && self.status == FlagStatus::Inactive {
            self.status = FlagStatus::Active;
        } else if !self.enabled && self.status == FlagStatus::Active {
            self.status = FlagStatus::Inactive;
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.status = FlagStatus::Active;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.status = FlagStatus::Inactive;
    }

    pub fn archive(&mut self) {
        self.enabled = false;
        self.status = FlagStatus::Archived;
    }
}

/// Editable identity of a flag. State changes go through the flag's own
/// mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagUpdate {
    pub name: String,
    pub description: Option<String>,
    pub environment: String,
}
