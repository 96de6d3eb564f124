// crates/batchwright-core/src/core/mutation.rs
// ============================================================================
// Module: Batchwright Mutations
// Description: Mutation requests, their summaries, and their outcomes.
// Purpose: Define the unit of work flowing from producers to workers.
// Dependencies: crate::core, crate::interfaces, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`MutationRequest`] is moved into the work queue on submission and is
//! consumed exactly once by one worker. Results are reported as a
//! [`MutationResult`]; errors carry a [`RequestSummary`] rather than the full
//! payload so error lists stay small.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::RecordId;
use crate::core::identifiers::RequestId;
use crate::core::record::NewRecord;
use crate::core::record::Properties;
use crate::core::record::StoredRecord;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Mutations
// ============================================================================

/// Kind of mutation carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Record creation.
    Create,
    /// Property update of an existing record.
    Update,
    /// Record deletion.
    Delete,
}

impl MutationKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Mutation target applied by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create a new record from a full payload.
    Create(NewRecord),
    /// Merge `changes` into an existing record.
    Update {
        /// Record to update.
        id: RecordId,
        /// Properties to set.
        changes: Properties,
    },
    /// Delete an existing record.
    Delete {
        /// Record to delete.
        id: RecordId,
    },
}

impl Mutation {
    /// Returns the mutation kind.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create(_) => MutationKind::Create,
            Self::Update {
                ..
            } => MutationKind::Update,
            Self::Delete {
                ..
            } => MutationKind::Delete,
        }
    }
}

/// Callback invoked once with the result of a single request.
///
/// Runs on a worker thread; keep it short and non-blocking.
pub type RequestCallback = Box<dyn FnOnce(&MutationResult) + Send + 'static>;

/// Unit of work submitted to the executor.
pub struct MutationRequest {
    /// Mutation to apply.
    pub mutation: Mutation,
    /// Optional per-request completion callback.
    pub callback: Option<RequestCallback>,
}

impl MutationRequest {
    /// Creates a request without a callback.
    #[must_use]
    pub const fn new(mutation: Mutation) -> Self {
        Self {
            mutation,
            callback: None,
        }
    }

    /// Creates a record-creation request.
    #[must_use]
    pub const fn create(record: NewRecord) -> Self {
        Self::new(Mutation::Create(record))
    }

    /// Creates a property-update request.
    #[must_use]
    pub const fn update(id: RecordId, changes: Properties) -> Self {
        Self::new(Mutation::Update {
            id,
            changes,
        })
    }

    /// Creates a deletion request.
    #[must_use]
    pub const fn delete(id: RecordId) -> Self {
        Self::new(Mutation::Delete {
            id,
        })
    }

    /// Attaches a completion callback.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&MutationResult) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for MutationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRequest")
            .field("mutation", &self.mutation)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

// ============================================================================
// SECTION: Summaries and Outcomes
// ============================================================================

/// Payload-free description of a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    /// Submission sequence number.
    pub id: RequestId,
    /// Mutation kind.
    pub kind: MutationKind,
    /// Record type for creations.
    pub record_type: Option<String>,
    /// Target record for updates and deletions.
    pub record_id: Option<RecordId>,
}

impl RequestSummary {
    /// Summarizes a mutation submitted under `id`.
    #[must_use]
    pub fn of(id: RequestId, mutation: &Mutation) -> Self {
        let (record_type, record_id) = match mutation {
            Mutation::Create(record) => (Some(record.record_type.clone()), None),
            Mutation::Update {
                id, ..
            }
            | Mutation::Delete {
                id,
            } => (None, Some(*id)),
        };
        Self {
            id,
            kind: mutation.kind(),
            record_type,
            record_id,
        }
    }
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.kind.as_str())?;
        if let Some(record_type) = &self.record_type {
            write!(f, " {record_type}")?;
        }
        if let Some(record_id) = self.record_id {
            write!(f, " {record_id}")?;
        }
        Ok(())
    }
}

/// Successful result of an applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Record was created.
    Created(StoredRecord),
    /// Record was updated.
    Updated(StoredRecord),
    /// Record was deleted.
    Deleted(RecordId),
}

impl MutationOutcome {
    /// Returns the identity of the affected record.
    #[must_use]
    pub const fn record_id(&self) -> RecordId {
        match self {
            Self::Created(record) | Self::Updated(record) => record.id,
            Self::Deleted(id) => *id,
        }
    }
}

/// Failure recorded for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The store rejected this request; the rest of its window was unaffected.
    #[error("{0}")]
    Store(StoreError),
    /// The whole commit window was rolled back because of `0`.
    #[error("transaction invalidated: {0}")]
    TransactionInvalidated(StoreError),
}

impl MutationError {
    /// Returns the underlying store error.
    #[must_use]
    pub const fn store_error(&self) -> &StoreError {
        match self {
            Self::Store(error) | Self::TransactionInvalidated(error) => error,
        }
    }
}

/// Result of applying one request.
pub type MutationResult = Result<MutationOutcome, MutationError>;

/// Request that ended in an error, as exposed by error snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMutation {
    /// Summary of the failed request.
    pub request: RequestSummary,
    /// Recorded failure.
    pub error: MutationError,
}
