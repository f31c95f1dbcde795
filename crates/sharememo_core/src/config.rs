//! Core runtime configuration.
//!
//! # Responsibility
//! - Hold tunables shared by the sync engine, store bootstrap and logging.
//! - Load overrides from `SHAREMEMO_*` environment variables or JSON.
//!
//! # Invariants
//! - `debounce_ms` is strictly positive.
//! - `log_level` is one of `trace|debug|info|warn|error` after validation.
//! - `log_dir`, when set, is absolute.

use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Idle time after the last local edit before memo content is written.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_500;

pub const ENV_DEBOUNCE_MS: &str = "SHAREMEMO_DEBOUNCE_MS";
pub const ENV_DB_PATH: &str = "SHAREMEMO_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "SHAREMEMO_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "SHAREMEMO_LOG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub debounce_ms: u64,
    /// SQLite file for the local store; in-memory when unset.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Rolling log directory; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Builds config from process environment on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds config from an arbitrary key lookup on top of defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(raw) = read(ENV_DEBOUNCE_MS) {
            config.debounce_ms = raw.parse().map_err(|err: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: ENV_DEBOUNCE_MS,
                    value: raw.clone(),
                    reason: err.to_string(),
                }
            })?;
        }
        if let Some(raw) = read(ENV_DB_PATH) {
            config.db_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = read(ENV_LOG_LEVEL) {
            config.log_level = raw;
        }
        if let Some(raw) = read(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(raw));
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON config document; missing keys take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_DEBOUNCE_MS,
                value: "0".to_string(),
                reason: "debounce must be positive".to_string(),
            });
        }
        normalize_level(&self.log_level).map_err(|err| ConfigError::InvalidValue {
            key: ENV_LOG_LEVEL,
            value: self.log_level.clone(),
            reason: err.to_string(),
        })?;
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: ENV_LOG_DIR,
                    value: dir.display().to_string(),
                    reason: "log directory must be absolute".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
