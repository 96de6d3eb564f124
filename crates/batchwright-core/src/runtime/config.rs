// crates/batchwright-core/src/runtime/config.rs
// ============================================================================
// Module: Executor Configuration
// Description: Validated tuning knobs for the bulk-write executor.
// Purpose: Replace loose keyword options with an explicit, strict struct.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`ExecutorConfig`] is immutable once workers start. Deserialization rejects
//! unknown keys; [`ExecutorConfig::validate`] enforces hard limits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::runtime::ExecutorError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum number of worker threads.
pub const MAX_PARALLEL_LEVEL: usize = 64;
/// Maximum commit window size.
pub const MAX_COMMIT_EVERY: usize = 1_000_000;
/// Maximum idle-flush interval in milliseconds.
pub const MAX_FLUSH_INTERVAL_MS: u64 = 60_000;
/// Percentage of the backpressure threshold at which admission resumes.
pub const BACK_PRESSURE_RESUME_PERCENT: usize = 80;

/// Returns the default worker count.
const fn default_parallel_level() -> usize {
    1
}

/// Returns the default commit window size.
const fn default_commit_every() -> usize {
    1_000
}

/// Returns the default idle-flush interval in milliseconds.
const fn default_flush_interval_ms() -> u64 {
    50
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Executor tuning parameters.
///
/// # Invariants
/// - `parallel_level` is in `1..=MAX_PARALLEL_LEVEL`.
/// - `commit_every` is in `1..=MAX_COMMIT_EVERY`.
/// - `back_pressure_threshold`, when set, is greater than zero.
/// - `flush_interval_ms` is in `1..=MAX_FLUSH_INTERVAL_MS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Number of worker threads.
    #[serde(default = "default_parallel_level")]
    pub parallel_level: usize,
    /// Number of requests committed per transaction.
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,
    /// Queue depth at which producers block (unbounded when unset).
    #[serde(default)]
    pub back_pressure_threshold: Option<usize>,
    /// Idle time after which a partial window is committed (milliseconds).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel_level: default_parallel_level(),
            commit_every: default_commit_every(),
            back_pressure_threshold: None,
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl ExecutorConfig {
    /// Validates configured limits.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidConfig`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.parallel_level == 0 || self.parallel_level > MAX_PARALLEL_LEVEL {
            return Err(ExecutorError::InvalidConfig(format!(
                "parallel_level out of range: {} (max {MAX_PARALLEL_LEVEL})",
                self.parallel_level
            )));
        }
        if self.commit_every == 0 || self.commit_every > MAX_COMMIT_EVERY {
            return Err(ExecutorError::InvalidConfig(format!(
                "commit_every out of range: {} (max {MAX_COMMIT_EVERY})",
                self.commit_every
            )));
        }
        if self.back_pressure_threshold == Some(0) {
            return Err(ExecutorError::InvalidConfig(
                "back_pressure_threshold must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 || self.flush_interval_ms > MAX_FLUSH_INTERVAL_MS {
            return Err(ExecutorError::InvalidConfig(format!(
                "flush_interval_ms out of range: {} (max {MAX_FLUSH_INTERVAL_MS})",
                self.flush_interval_ms
            )));
        }
        Ok(())
    }

    /// Returns the idle-flush interval.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Returns the depth at which a blocked producer may resume.
    #[must_use]
    pub const fn resume_depth(&self) -> Option<usize> {
        match self.back_pressure_threshold {
            Some(threshold) => Some(
                threshold / 100 * BACK_PRESSURE_RESUME_PERCENT
                    + threshold % 100 * BACK_PRESSURE_RESUME_PERCENT / 100,
            ),
            None => None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
