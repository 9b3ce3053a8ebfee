//! Top-level Cohort configuration with layered resolution.

pub mod assignment_config;
pub mod defaults;
pub mod observability_config;
pub mod storage_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use assignment_config::AssignmentConfig;
pub use observability_config::ObservabilityConfig;
pub use storage_config::StorageConfig;

use crate::errors::ConfigError;

/// Aggregates all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. Environment variables (`COHORT_*`)
/// 2. TOML file passed to [`CohortConfig::load`]
/// 3. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CohortConfig {
    pub storage: StorageConfig,
    pub assignment: AssignmentConfig,
    pub observability: ObservabilityConfig,
}

impl CohortConfig {
    /// Load from an optional TOML file, then apply env overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string. Missing keys keep their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `COHORT_*` overrides. Unparseable numbers are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("COHORT_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Some(size) = lookup("COHORT_READ_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.storage.read_pool_size = size;
        }
        if let Some(level) = lookup("COHORT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(env) = lookup("COHORT_ENVIRONMENT") {
            self.assignment.default_environment = env;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=defaults::MAX_READ_POOL_SIZE).contains(&self.storage.read_pool_size) {
            return Err(ConfigError::ValidationFailed {
                field: "storage.read_pool_size".to_string(),
                message: format!("must be between 1 and {}", defaults::MAX_READ_POOL_SIZE),
            });
        }
        if self.storage.busy_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "storage.busy_timeout_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.assignment.default_environment.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "assignment.default_environment".to_string(),
                message: "must not be blank".to_string(),
            });
        }
        Ok(())
    }
}
