//! Completion conservation property-based tests.
//!
//! ## Purpose
//! Random mixes of valid and failing mutations are pushed through executors
//! with random window sizes and worker counts. Every accepted request must be
//! accounted for exactly once.
//!
//! ## What is covered
//! - `success_count + errors.len() == submitted` after close.
//! - Committed record count matches the number of successful creates.
// crates/batchwright-core/tests/proptest_conservation.rs
// ============================================================================
// Module: Conservation Property-Based Tests
// Description: Randomized request mixes against the in-memory handle.
// Purpose: Ensure no accepted request is dropped or double counted.
// ============================================================================

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
    reason = "Test-only assertions and helpers are permitted."
)]

use batchwright_core::BulkExecutor;
use batchwright_core::ExecutorConfig;
use batchwright_core::InMemoryHandle;
use batchwright_core::MutationKind;
use batchwright_core::MutationRequest;
use batchwright_core::NewRecord;
use batchwright_core::RecordId;
use batchwright_core::SharedHandle;
use batchwright_core::properties;
use proptest::prelude::*;
use serde_json::json;

/// Request shapes mixed by the generator.
#[derive(Debug, Clone)]
enum Op {
    /// Create with a fresh unique key.
    Create(u16),
    /// Create reusing a small key space, so some collide.
    CreateColliding(u8),
    /// Update a record that never exists.
    UpdateMissing(u32),
    /// Delete a record that never exists.
    DeleteMissing(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u16>().prop_map(Op::Create),
        (0_u8 .. 4).prop_map(Op::CreateColliding),
        any::<u32>().prop_map(Op::UpdateMissing),
        any::<u32>().prop_map(Op::DeleteMissing),
    ]
}

fn to_request(index: usize, op: &Op) -> MutationRequest {
    let missing = |raw: u32| RecordId::from_raw(1_000_000 + u64::from(raw));
    match op {
        Op::Create(tag) => MutationRequest::create(NewRecord::vertex(
            "Node",
            properties([("key", json!(format!("fresh-{index}"))), ("tag", json!(tag))]),
        )),
        Op::CreateColliding(key) => MutationRequest::create(NewRecord::vertex(
            "Node",
            properties([("key", json!(format!("shared-{key}")))]),
        )),
        Op::UpdateMissing(raw) => {
            MutationRequest::update(missing(*raw), properties([("touched", json!(true))]))
        }
        Op::DeleteMissing(raw) => MutationRequest::delete(missing(*raw)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_submitted_request_is_accounted_once(
        ops in prop::collection::vec(op_strategy(), 1 .. 80),
        commit_every in 1_usize .. 9,
        parallel_level in 1_usize .. 4,
    ) {
        let mut handle = InMemoryHandle::new();
        handle.declare_unique("Node", "key");
        let probe = handle.probe();
        let config = ExecutorConfig {
            parallel_level,
            commit_every,
            back_pressure_threshold: Some(16),
            flush_interval_ms: 2,
        };
        let executor = BulkExecutor::with_config(SharedHandle::new(handle), config).unwrap();
        for (index, op) in ops.iter().enumerate() {
            executor.submit(to_request(index, op)).unwrap();
        }
        executor.close().unwrap();

        let snapshot = executor.snapshot();
        let submitted = u64::try_from(ops.len()).unwrap();
        prop_assert_eq!(snapshot.submitted, submitted);
        prop_assert_eq!(snapshot.pending, 0);
        prop_assert_eq!(snapshot.success_count + u64::try_from(snapshot.errors.len()).unwrap(), submitted);
        prop_assert_eq!(snapshot.error_count, u64::try_from(snapshot.errors.len()).unwrap());

        let created = snapshot.success_count;
        prop_assert_eq!(u64::try_from(probe.count_type("Node")).unwrap(), created);
        let failures_well_typed = snapshot.errors.iter().all(|failure| {
            failure.request.kind != MutationKind::Create
                || failure.request.record_type.as_deref() == Some("Node")
        });
        prop_assert!(failures_well_typed);
    }
}
