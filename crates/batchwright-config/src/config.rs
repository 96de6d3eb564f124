// crates/batchwright-config/src/config.rs
// ============================================================================
// Module: Batchwright Configuration
// Description: Configuration loading and validation for batchwright.toml.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: batchwright-core, batchwright-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`BatchwrightConfig::load`] resolves the config path from the caller, the
//! `BATCHWRIGHT_CONFIG` environment variable, or `batchwright.toml` in the
//! working directory. The file must be UTF-8, at most 1 MiB, and contain only
//! known keys.
//!
//! Security posture: config inputs are untrusted and validated before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use batchwright_core::BulkExecutor;
use batchwright_core::ExecutorConfig;
use batchwright_core::SharedHandle;
use batchwright_store_sqlite::SqliteHandle;
use batchwright_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config file name.
const DEFAULT_CONFIG_NAME: &str = "batchwright.toml";
/// Environment variable for config path overrides.
pub const CONFIG_ENV_VAR: &str = "BATCHWRIGHT_CONFIG";
/// Maximum size of the config file in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level Batchwright configuration.
///
/// # Invariants
/// - Unknown keys are rejected at every level.
/// - A loaded config has passed [`BatchwrightConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchwrightConfig {
    /// Executor tuning.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// `SQLite` handle settings.
    pub store: SqliteStoreConfig,
}

impl BatchwrightConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates executor and store limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a section is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.executor
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("executor: {err}")))?;
        self.store.validate().map_err(|err| ConfigError::Invalid(format!("store: {err}")))?;
        Ok(())
    }

    /// Opens the configured store and builds an executor over it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the store cannot be opened or the
    /// executor rejects the settings.
    pub fn open_executor(&self) -> Result<BulkExecutor<SqliteHandle>, ConfigError> {
        let handle = SqliteHandle::new(self.store.clone())
            .map_err(|err| ConfigError::Store(err.to_string()))?;
        BulkExecutor::with_config(SharedHandle::new(handle), self.executor.clone())
            .map_err(|err| ConfigError::Invalid(format!("executor: {err}")))
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The configured store could not be opened.
    #[error("config store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn resolve_path_prefers_explicit_argument() {
        let resolved = resolve_path(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(resolved, PathBuf::from("custom.toml"));
    }

    #[test]
    fn validate_path_accepts_ordinary_paths() {
        assert!(validate_path(Path::new("./config/batchwright.toml")).is_ok());
    }

    #[test]
    fn validate_path_rejects_long_component() {
        let component = "c".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        let error = validate_path(Path::new(&component)).unwrap_err();
        assert!(error.to_string().contains("component too long"));
    }
}
