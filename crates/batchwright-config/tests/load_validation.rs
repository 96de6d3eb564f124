//! Config load validation tests for batchwright-config.
// crates/batchwright-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, keys).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io::Write;
use std::path::Path;

use batchwright_config::BatchwrightConfig;
use batchwright_config::ConfigError;
use batchwright_core::ExecutorConfig;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<BatchwrightConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(BatchwrightConfig::load(Some(path)), "config path exceeds max length")?;
    Ok(())
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(BatchwrightConfig::load(Some(path)), "config path component too long")?;
    Ok(())
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'a'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(BatchwrightConfig::load(Some(file.path())), "config file exceeds size limit")?;
    Ok(())
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(BatchwrightConfig::load(Some(file.path())), "config file must be utf-8")?;
    Ok(())
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let missing = dir.path().join("absent.toml");
    match BatchwrightConfig::load(Some(&missing)) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config(
        "[store]\npath = \"store.db\"\n\n[executor]\ncommit_every = 10\nturbo = true\n",
    )?;
    match BatchwrightConfig::load(Some(file.path())) {
        Err(ConfigError::Parse(message)) if message.contains("turbo") => Ok(()),
        other => Err(format!("expected parse error naming the key, got {other:?}")),
    }
}

#[test]
fn load_rejects_unknown_top_level_section() -> TestResult {
    let file = write_config("[store]\npath = \"store.db\"\n\n[metrics]\nenabled = true\n")?;
    match BatchwrightConfig::load(Some(file.path())) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn load_requires_store_section() -> TestResult {
    let file = write_config("[executor]\ncommit_every = 10\n")?;
    match BatchwrightConfig::load(Some(file.path())) {
        Err(ConfigError::Parse(message)) if message.contains("store") => Ok(()),
        other => Err(format!("expected missing store error, got {other:?}")),
    }
}

#[test]
fn load_applies_executor_defaults() -> TestResult {
    let file = write_config("[store]\npath = \"data/store.db\"\n")?;
    let config = BatchwrightConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.executor != ExecutorConfig::default() {
        return Err(format!("unexpected executor defaults: {:?}", config.executor));
    }
    if config.store.busy_timeout_ms != 5_000 {
        return Err(format!("unexpected busy timeout: {}", config.store.busy_timeout_ms));
    }
    Ok(())
}

#[test]
fn load_reads_full_configuration() -> TestResult {
    let file = write_config(
        "[executor]\nparallel_level = 4\ncommit_every = 250\nback_pressure_threshold = \
         1000\nflush_interval_ms = 20\n\n[store]\npath = \"store.db\"\nbusy_timeout_ms = \
         1500\njournal_mode = \"delete\"\nsync_mode = \"normal\"\n",
    )?;
    let config = BatchwrightConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.executor.parallel_level != 4 || config.executor.commit_every != 250 {
        return Err(format!("unexpected executor: {:?}", config.executor));
    }
    if config.executor.resume_depth() != Some(800) {
        return Err(format!("unexpected resume depth: {:?}", config.executor.resume_depth()));
    }
    if config.store.journal_mode.pragma_value() != "delete"
        || config.store.sync_mode.pragma_value() != "normal"
    {
        return Err(format!("unexpected store modes: {:?}", config.store));
    }
    Ok(())
}

#[test]
fn load_rejects_out_of_range_executor_values() -> TestResult {
    let file = write_config("[executor]\ncommit_every = 0\n\n[store]\npath = \"store.db\"\n")?;
    assert_invalid(BatchwrightConfig::load(Some(file.path())), "commit_every out of range")?;
    let file =
        write_config("[executor]\nback_pressure_threshold = 0\n\n[store]\npath = \"store.db\"\n")?;
    assert_invalid(BatchwrightConfig::load(Some(file.path())), "back_pressure_threshold")?;
    Ok(())
}

#[test]
fn load_rejects_invalid_store_values() -> TestResult {
    let file = write_config("[store]\npath = \"\"\n")?;
    assert_invalid(BatchwrightConfig::load(Some(file.path())), "store path must not be empty")?;
    let file = write_config("[store]\npath = \"store.db\"\nbusy_timeout_ms = 900000\n")?;
    assert_invalid(BatchwrightConfig::load(Some(file.path())), "busy_timeout_ms out of range")?;
    Ok(())
}

#[test]
fn open_executor_writes_through_configured_store() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let db_path = dir.path().join("nested").join("store.db");
    let content = format!(
        "[executor]\ncommit_every = 5\nflush_interval_ms = 30000\n\n[store]\npath = {}\n",
        toml_string(&db_path.display().to_string())
    );
    let config = BatchwrightConfig::from_toml_str(&content).map_err(|err| err.to_string())?;
    let executor = config.open_executor().map_err(|err| err.to_string())?;
    for seq in 0 .. 12_u64 {
        let record = batchwright_core::NewRecord::vertex(
            "Item",
            batchwright_core::properties([("seq", serde_json::json!(seq))]),
        );
        executor.create(record).map_err(|err| err.to_string())?;
    }
    executor.close().map_err(|err| err.to_string())?;
    let count = executor
        .handle()
        .with(|handle| handle.count_type("Item"))
        .map_err(|err| err.to_string())?
        .map_err(|err| err.to_string())?;
    if count != 12 {
        return Err(format!("expected 12 records, found {count}"));
    }
    let commits = executor.handle().with(|handle| handle.stats().commits).map_err(|err| err.to_string())?;
    if commits != 3 {
        return Err(format!("expected 3 commits, found {commits}"));
    }
    Ok(())
}

fn toml_string(value: &str) -> String {
    format!("'{value}'")
}
