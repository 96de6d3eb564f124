// crates/batchwright-core/src/core/mod.rs
// ============================================================================
// Module: Batchwright Core Types
// Description: Records, mutations, and identifiers shared by all components.
// Purpose: Provide stable types for the bulk-write data model.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Core types describe what producers submit and what workers report back.
//! They carry no synchronization of their own.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod mutation;
pub mod record;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ParseRecordIdError;
pub use identifiers::RecordId;
pub use identifiers::RequestId;
pub use identifiers::TransactionRef;
pub use mutation::FailedMutation;
pub use mutation::Mutation;
pub use mutation::MutationError;
pub use mutation::MutationKind;
pub use mutation::MutationOutcome;
pub use mutation::MutationRequest;
pub use mutation::MutationResult;
pub use mutation::RequestCallback;
pub use mutation::RequestSummary;
pub use record::EdgeEndpoints;
pub use record::NewRecord;
pub use record::Properties;
pub use record::RecordKind;
pub use record::StoredRecord;
pub use record::properties;
