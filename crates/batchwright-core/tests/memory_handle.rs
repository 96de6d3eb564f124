// crates/batchwright-core/tests/memory_handle.rs
// ============================================================================
// Module: In-Memory Handle Tests
// Description: Direct transactional behavior of the in-memory handle.
// Purpose: Validate staging, constraints, and fault injection in isolation.
// Dependencies: batchwright-core, serde_json
// ============================================================================
//! ## Overview
//! Calls [`TransactionalHandle`] methods directly, without an executor, to
//! pin down the store semantics the coordinator tests rely on.

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

use batchwright_core::InMemoryHandle;
use batchwright_core::NewRecord;
use batchwright_core::Properties;
use batchwright_core::RecordId;
use batchwright_core::StoreError;
use batchwright_core::TransactionalHandle;
use batchwright_core::properties;
use serde_json::json;

#[test]
fn staged_writes_are_invisible_until_commit() {
    let mut handle = InMemoryHandle::new();
    let probe = handle.probe();
    let tx = handle.begin().unwrap();
    let created = handle.create(&tx, &NewRecord::vertex("City", properties([("name", json!("Oslo"))]))).unwrap();
    assert!(probe.in_transaction());
    assert!(probe.get(created.id).is_none());
    handle.commit(tx).unwrap();
    assert_eq!(probe.get(created.id).unwrap().properties["name"], json!("Oslo"));
    assert_eq!(probe.commits(), 1);
}

#[test]
fn rollback_discards_staged_writes_and_identities() {
    let mut handle = InMemoryHandle::new();
    let probe = handle.probe();
    let tx = handle.begin().unwrap();
    let discarded = handle.create(&tx, &NewRecord::document("Doc", Properties::new())).unwrap();
    handle.rollback(tx);
    assert!(probe.is_empty());
    assert_eq!(probe.rollbacks(), 1);

    let tx = handle.begin().unwrap();
    let kept = handle.create(&tx, &NewRecord::document("Doc", Properties::new())).unwrap();
    handle.commit(tx).unwrap();
    assert_eq!(kept.id, discarded.id);
    assert_eq!(probe.len(), 1);
}

#[test]
fn only_one_transaction_may_be_open() {
    let mut handle = InMemoryHandle::new();
    let tx = handle.begin().unwrap();
    assert!(matches!(handle.begin(), Err(StoreError::Conflict(_))));
    handle.rollback(tx);
    assert!(handle.begin().is_ok());
}

#[test]
fn updates_merge_properties_and_respect_unique_constraints() {
    let mut handle = InMemoryHandle::new();
    handle.declare_unique("User", "email");
    let probe = handle.probe();
    let tx = handle.begin().unwrap();
    let first = handle.create(&tx, &NewRecord::vertex("User", properties([("email", json!("a@x"))]))).unwrap();
    let second = handle.create(&tx, &NewRecord::vertex("User", properties([("email", json!("b@x"))]))).unwrap();
    let clash = handle.update(&tx, second.id, &properties([("email", json!("a@x"))]));
    assert!(matches!(clash, Err(StoreError::Constraint(_))));
    let merged = handle.update(&tx, first.id, &properties([("age", json!(41))])).unwrap();
    assert_eq!(merged.properties["email"], json!("a@x"));
    assert_eq!(merged.properties["age"], json!(41));
    handle.commit(tx).unwrap();
    assert_eq!(probe.get(second.id).unwrap().properties["email"], json!("b@x"));
}

#[test]
fn edges_require_existing_vertex_endpoints() {
    let mut handle = InMemoryHandle::new();
    let tx = handle.begin().unwrap();
    let person = handle.create(&tx, &NewRecord::vertex("Person", Properties::new())).unwrap();
    let note = handle.create(&tx, &NewRecord::document("Note", Properties::new())).unwrap();
    let missing = RecordId::from_raw(999);

    let dangling = handle.create(&tx, &NewRecord::edge("Wrote", person.id, missing, Properties::new()));
    assert_eq!(dangling.err(), Some(StoreError::NotFound(missing)));
    let not_vertex = handle.create(&tx, &NewRecord::edge("Wrote", person.id, note.id, Properties::new()));
    assert!(matches!(not_vertex, Err(StoreError::Invalid(_))));
    assert!(handle.create(&tx, &NewRecord::edge("Knows", person.id, person.id, Properties::new())).is_ok());
    handle.commit(tx).unwrap();
}

#[test]
fn deletes_are_staged_and_missing_ids_fail() {
    let mut handle = InMemoryHandle::new();
    let probe = handle.probe();
    let tx = handle.begin().unwrap();
    let record = handle.create(&tx, &NewRecord::document("Doc", Properties::new())).unwrap();
    handle.commit(tx).unwrap();

    let tx = handle.begin().unwrap();
    handle.delete(&tx, record.id).unwrap();
    assert_eq!(handle.delete(&tx, record.id), Err(StoreError::NotFound(record.id)));
    assert!(probe.get(record.id).is_some());
    handle.commit(tx).unwrap();
    assert!(probe.get(record.id).is_none());
}

#[test]
fn injected_faults_surface_as_fatal_errors() {
    let mut handle = InMemoryHandle::new();
    handle.abort_on_value("state", json!("corrupt"));
    handle.fail_next_commit();

    let tx = handle.begin().unwrap();
    let aborted = handle.create(&tx, &NewRecord::document("Doc", properties([("state", json!("corrupt"))])));
    let error = aborted.unwrap_err();
    assert!(error.is_fatal());
    handle.create(&tx, &NewRecord::document("Doc", properties([("state", json!("ok"))]))).unwrap();
    let commit = handle.commit(tx);
    assert!(matches!(commit, Err(StoreError::Io(_))));
    assert!(commit.unwrap_err().is_fatal());
    assert_eq!(handle.count_type("Doc"), 0);

    let tx = handle.begin().unwrap();
    handle.create(&tx, &NewRecord::document("Doc", properties([("state", json!("ok"))]))).unwrap();
    handle.commit(tx).unwrap();
    assert_eq!(handle.count_type("Doc"), 1);
}

#[test]
fn non_fatal_errors_are_classified() {
    assert!(!StoreError::Constraint("dup".to_string()).is_fatal());
    assert!(!StoreError::NotFound(RecordId::from_raw(1)).is_fatal());
    assert!(!StoreError::Invalid("bad".to_string()).is_fatal());
    assert!(StoreError::Conflict("busy".to_string()).is_fatal());
    assert_eq!(RecordId::from_raw(7).to_string(), "#7");
    assert_eq!("#7".parse::<RecordId>().unwrap(), RecordId::from_raw(7));
    assert!("seven".parse::<RecordId>().is_err());
}
