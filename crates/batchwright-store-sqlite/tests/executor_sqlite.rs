// crates/batchwright-store-sqlite/tests/executor_sqlite.rs
// ============================================================================
// Module: SQLite Executor Tests
// Description: Bulk executor and batch scope running against SQLite.
// Purpose: Validate commit windowing and per-request errors on a durable store.
// Dependencies: batchwright-store-sqlite, batchwright-core, tempfile
// ============================================================================
//! ## Overview
//! End-to-end runs through [`BulkExecutor`] and [`scope`] with a
//! [`SqliteHandle`], checking committed rows and transaction counters.

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

use std::time::Duration;

use batchwright_core::BulkExecutor;
use batchwright_core::ExecutorConfig;
use batchwright_core::ExecutorError;
use batchwright_core::FailedMutation;
use batchwright_core::MutationError;
use batchwright_core::NewRecord;
use batchwright_core::Properties;
use batchwright_core::RecordId;
use batchwright_core::RequestId;
use batchwright_core::ScopeError;
use batchwright_core::SharedHandle;
use batchwright_core::StoreError;
use batchwright_core::TransactionalHandle;
use batchwright_core::properties;
use batchwright_core::scope;
use batchwright_store_sqlite::SqliteHandle;
use batchwright_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use tempfile::TempDir;

/// Windows close only on size or shutdown with this interval.
const NO_IDLE_FLUSH_MS: u64 = 30_000;

fn shared(dir: &TempDir) -> SharedHandle<SqliteHandle> {
    let config = SqliteStoreConfig::new(dir.path().join("store.db"));
    SharedHandle::new(SqliteHandle::new(config).unwrap())
}

fn windowed(commit_every: usize) -> ExecutorConfig {
    ExecutorConfig {
        parallel_level: 1,
        commit_every,
        back_pressure_threshold: None,
        flush_interval_ms: NO_IDLE_FLUSH_MS,
    }
}

#[test]
fn five_hundred_creates_commit_in_five_sqlite_transactions() {
    let dir = TempDir::new().unwrap();
    let store = shared(&dir);
    let executor = BulkExecutor::with_config(store.clone(), windowed(100)).unwrap();
    for seq in 0 .. 500 {
        executor.create(NewRecord::vertex("Item", properties([("seq", json!(seq))]))).unwrap();
    }
    assert!(executor.wait_completion(Some(Duration::from_secs(30))));
    executor.close().unwrap();

    assert_eq!(executor.success_count(), 500);
    let (count, stats) = store.with(|handle| (handle.count_type("Item").unwrap(), handle.stats())).unwrap();
    assert_eq!(count, 500);
    assert_eq!(stats.begins, 5);
    assert_eq!(stats.commits, 5);
    assert_eq!(stats.rollbacks, 0);
}

#[test]
fn unique_violation_fails_one_request_and_commits_the_rest() {
    let dir = TempDir::new().unwrap();
    let store = shared(&dir);
    store.with(|handle| handle.declare_unique("User", "email")).unwrap().unwrap();
    let executor = BulkExecutor::with_config(store.clone(), windowed(10)).unwrap();
    for index in 1 ..= 10 {
        let email = if index == 5 { "u1@x".to_string() } else { format!("u{index}@x") };
        executor.create(NewRecord::vertex("User", properties([("email", json!(email))]))).unwrap();
    }
    executor.close().unwrap();

    let errors = executor.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].request.id, RequestId::from_raw(5));
    assert!(matches!(errors[0].error, MutationError::Store(StoreError::Constraint(_))));
    assert_eq!(executor.success_count(), 9);
    let (count, commits) = store.with(|handle| (handle.count_type("User").unwrap(), handle.stats().commits)).unwrap();
    assert_eq!(count, 9);
    assert_eq!(commits, 1);
}

#[test]
fn single_worker_preserves_submission_order() {
    let dir = TempDir::new().unwrap();
    let store = shared(&dir);
    let executor = BulkExecutor::with_config(store.clone(), windowed(7)).unwrap();
    for seq in 0 .. 40 {
        executor.create(NewRecord::document("Row", properties([("seq", json!(seq))]))).unwrap();
    }
    executor.close().unwrap();
    let rows = store.with(|handle| handle.list_type("Row").unwrap()).unwrap();
    let seqs: Vec<_> = rows.iter().map(|row| row.properties["seq"].as_u64().unwrap()).collect();
    assert_eq!(seqs, (0 .. 40).collect::<Vec<u64>>());
}

#[test]
fn multiple_workers_serialize_on_one_connection() {
    let dir = TempDir::new().unwrap();
    let store = shared(&dir);
    let config = ExecutorConfig {
        parallel_level: 4,
        commit_every: 25,
        back_pressure_threshold: Some(64),
        flush_interval_ms: 10,
    };
    let executor = BulkExecutor::with_config(store.clone(), config).unwrap();
    for seq in 0 .. 300 {
        executor.create(NewRecord::vertex("Item", properties([("seq", json!(seq))]))).unwrap();
    }
    executor.close().unwrap();
    assert_eq!(executor.success_count(), 300);
    assert!(executor.errors().is_empty());
    let count = store.with(|handle| handle.count_type("Item").unwrap()).unwrap();
    assert_eq!(count, 300);
}

#[test]
fn scope_writes_graph_and_reports_missing_endpoints() {
    let dir = TempDir::new().unwrap();
    let store = shared(&dir);
    let (alice, bob) = store
        .with(|handle| {
            let tx = handle.begin().unwrap();
            let alice = handle.create(&tx, &NewRecord::vertex("Person", properties([("name", json!("alice"))]))).unwrap();
            let bob = handle.create(&tx, &NewRecord::vertex("Person", properties([("name", json!("bob"))]))).unwrap();
            handle.commit(tx).unwrap();
            (alice.id, bob.id)
        })
        .unwrap();

    let missing = RecordId::from_raw(10_000);
    let result: Result<Vec<FailedMutation>, ScopeError<ExecutorError>> = scope(&store, windowed(50), |batch| {
        batch.create_edge("Knows", alice, bob, properties([("since", json!(2020))]))?;
        batch.create_edge("Knows", alice, missing, Properties::new())?;
        batch.update_record(bob, properties([("age", json!(33))]))?;
        let _ = batch.wait_completion(None);
        Ok(batch.errors())
    });
    let errors = result.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, MutationError::Store(StoreError::NotFound(id)) if id == missing));
    assert!(!store.batch_active());

    let (edges, bob_age) = store
        .with(|handle| {
            (handle.count_type("Knows").unwrap(), handle.get(bob).unwrap().unwrap().properties["age"].clone())
        })
        .unwrap();
    assert_eq!(edges, 1);
    assert_eq!(bob_age, json!(33));
}
