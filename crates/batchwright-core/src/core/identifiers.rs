// crates/batchwright-core/src/core/identifiers.rs
// ============================================================================
// Module: Batchwright Identifiers
// Description: Opaque identifiers for stored records, requests, and transactions.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are small copyable wrappers. [`RecordId`] renders as `#<n>` and
//! parses back from the same form. [`RequestId`] is the submission sequence
//! assigned by the work queue and is strictly increasing per executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Record Identifier
// ============================================================================

/// Identity of a record persisted by a transactional handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a record identifier from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned when a record identifier string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid record id: {0}")]
pub struct ParseRecordIdError(String);

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        digits.parse::<u64>().map(Self).map_err(|_| ParseRecordIdError(value.to_string()))
    }
}

// ============================================================================
// SECTION: Request Identifier
// ============================================================================

/// Submission sequence number assigned to a mutation request.
///
/// # Invariants
/// - Values start at 1 and increase by one per accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request identifier from its raw sequence value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ============================================================================
// SECTION: Transaction Reference
// ============================================================================

/// Token for a transaction opened by a [`crate::TransactionalHandle`].
///
/// # Invariants
/// - Only the handle that issued the token interprets its value.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TransactionRef(u64);

impl TransactionRef {
    /// Creates a transaction token; intended for handle implementations.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}
