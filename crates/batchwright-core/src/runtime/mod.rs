// crates/batchwright-core/src/runtime/mod.rs
// ============================================================================
// Module: Batchwright Runtime
// Description: Work queue, worker pool, completion tracking, and batch facade.
// Purpose: Coordinate asynchronous bulk mutations against a shared handle.
// Dependencies: crate::{core, interfaces}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Producers submit requests through a [`BulkExecutor`] or a scoped [`Batch`].
//! Requests pass the backpressure gate into a FIFO queue, worker threads
//! group them into commit windows against the shared handle, and results flow
//! back into a completion tracker whose accessors return copies.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod batch;
pub mod config;
pub mod executor;
pub mod memory;
mod queue;
pub mod telemetry;
mod tracker;
mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use batch::Batch;
pub use batch::BatchProgress;
pub use batch::BatchReport;
pub use batch::ScopeError;
pub use batch::scope;
pub use config::ExecutorConfig;
pub use executor::BulkExecutor;
pub use executor::ExecutorError;
pub use memory::InMemoryHandle;
pub use memory::MemoryProbe;
pub use telemetry::BackpressureEvent;
pub use telemetry::ExecutorMetrics;
pub use telemetry::ExecutorStats;
pub use telemetry::JsonLinesMetrics;
pub use telemetry::NoopMetrics;
pub use telemetry::WindowEvent;
pub use telemetry::WindowOutcome;
pub use tracker::CompletionSnapshot;
pub use worker::GlobalCallback;
