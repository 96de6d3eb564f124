// crates/batchwright-core/src/interfaces/mod.rs
// ============================================================================
// Module: Batchwright Interfaces
// Description: Backend-agnostic contract for transactional record stores.
// Purpose: Define the handle surface the coordinator drives and how it is shared.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! A [`TransactionalHandle`] is one session against an embedded transactional
//! store. Handles are not assumed to be thread-safe: the coordinator only
//! reaches them through a [`SharedHandle`], which serializes access so that at
//! most one transaction is open at a time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::core::NewRecord;
use crate::core::Properties;
use crate::core::RecordId;
use crate::core::StoredRecord;
use crate::core::TransactionRef;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors reported by a transactional handle.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - [`StoreError::is_fatal`] decides whether the open transaction survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A constraint (for example a unique property) rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// The referenced record does not exist.
    #[error("record not found: {0}")]
    NotFound(RecordId),
    /// The request payload is malformed for this store.
    #[error("invalid mutation: {0}")]
    Invalid(String),
    /// A concurrent writer conflicted with the open transaction.
    #[error("transaction conflict: {0}")]
    Conflict(String),
    /// Underlying I/O or engine failure.
    #[error("store io error: {0}")]
    Io(String),
    /// The store aborted the open transaction.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

impl StoreError {
    /// Returns true when the open transaction can no longer be committed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Io(_) | Self::TransactionAborted(_))
    }
}

// ============================================================================
// SECTION: Transactional Handle
// ============================================================================

/// One session against a transactional record store.
///
/// Implementations may assume calls are serialized and that at most one
/// transaction is open at a time.
pub trait TransactionalHandle: Send {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot start a transaction.
    fn begin(&mut self) -> Result<TransactionRef, StoreError>;

    /// Commits a transaction, making its writes visible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; the writes are discarded.
    fn commit(&mut self, tx: TransactionRef) -> Result<(), StoreError>;

    /// Rolls back a transaction, discarding its writes.
    fn rollback(&mut self, tx: TransactionRef);

    /// Creates a record inside `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    fn create(&mut self, tx: &TransactionRef, record: &NewRecord)
    -> Result<StoredRecord, StoreError>;

    /// Merges `changes` into an existing record inside `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record is missing or cannot be written.
    fn update(
        &mut self,
        tx: &TransactionRef,
        id: RecordId,
        changes: &Properties,
    ) -> Result<StoredRecord, StoreError>;

    /// Deletes a record inside `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record is missing or cannot be deleted.
    fn delete(&mut self, tx: &TransactionRef, id: RecordId) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Shared Handle
// ============================================================================

/// Cloneable, thread-safe owner of a transactional handle.
///
/// # Invariants
/// - The wrapped handle is only reachable through the internal mutex.
/// - At most one batch scope is active per shared handle.
pub struct SharedHandle<H> {
    /// Shared state.
    inner: Arc<SharedInner<H>>,
}

/// State shared by all clones of a [`SharedHandle`].
struct SharedInner<H> {
    /// Serialized handle access.
    handle: Mutex<H>,
    /// Set while a batch scope owns the handle.
    batch_active: AtomicBool,
}

impl<H> Clone for SharedHandle<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: TransactionalHandle> SharedHandle<H> {
    /// Wraps a handle for shared use.
    #[must_use]
    pub fn new(handle: H) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                handle: Mutex::new(handle),
                batch_active: AtomicBool::new(false),
            }),
        }
    }

    /// Runs `f` with exclusive access to the handle.
    ///
    /// Blocks while a worker holds an open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the handle mutex is poisoned.
    pub fn with<R>(&self, f: impl FnOnce(&mut H) -> R) -> Result<R, StoreError> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Returns true while a batch scope is active on this handle.
    #[must_use]
    pub fn batch_active(&self) -> bool {
        self.inner.batch_active.load(Ordering::Acquire)
    }

    /// Locks the handle for one commit window.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, H>, StoreError> {
        self.inner
            .handle
            .lock()
            .map_err(|_| StoreError::Io("store handle mutex poisoned".to_string()))
    }

    /// Claims the handle for a batch scope; `None` when one is already active.
    pub(crate) fn claim_batch(&self) -> Option<BatchClaim<H>> {
        self.inner
            .batch_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BatchClaim {
                shared: self.clone(),
            })
    }
}

/// Releases the batch claim on drop.
pub(crate) struct BatchClaim<H> {
    /// Claimed handle.
    shared: SharedHandle<H>,
}

impl<H> Drop for BatchClaim<H> {
    fn drop(&mut self) {
        self.shared.inner.batch_active.store(false, Ordering::Release);
    }
}
