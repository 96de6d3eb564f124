// crates/batchwright-core/src/lib.rs
// ============================================================================
// Module: Batchwright Core Library
// Description: Public API surface for the Batchwright bulk-write coordinator.
// Purpose: Expose core types, the handle interface, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Batchwright drains mutation requests from producer threads into bounded
//! commit windows against a transactional record store. Stores plug in
//! through [`TransactionalHandle`]; callers use [`BulkExecutor`] directly or
//! the scoped [`Batch`] facade, which guarantees drain and shutdown when the
//! scope ends.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::SharedHandle;
pub use interfaces::StoreError;
pub use interfaces::TransactionalHandle;
pub use runtime::BackpressureEvent;
pub use runtime::Batch;
pub use runtime::BatchProgress;
pub use runtime::BatchReport;
pub use runtime::BulkExecutor;
pub use runtime::CompletionSnapshot;
pub use runtime::ExecutorConfig;
pub use runtime::ExecutorError;
pub use runtime::ExecutorMetrics;
pub use runtime::ExecutorStats;
pub use runtime::GlobalCallback;
pub use runtime::InMemoryHandle;
pub use runtime::JsonLinesMetrics;
pub use runtime::MemoryProbe;
pub use runtime::NoopMetrics;
pub use runtime::ScopeError;
pub use runtime::WindowEvent;
pub use runtime::WindowOutcome;
pub use runtime::scope;
