// crates/batchwright-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Transactional Handle
// Description: Transactional record store held entirely in process memory.
// Purpose: Provide a deterministic handle for embedding, demos, and tests.
// Dependencies: crate::core, crate::interfaces, serde_json
// ============================================================================

//! ## Overview
//! [`InMemoryHandle`] stages writes per transaction and applies them on
//! commit. It enforces unique properties declared with
//! [`InMemoryHandle::declare_unique`], counts begins, commits, and rollbacks,
//! and supports fault injection: a per-commit delay, a failing next commit,
//! and invalidating the open transaction when a chosen property value is
//! written. A [`MemoryProbe`] observes committed state from any thread.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::core::NewRecord;
use crate::core::Properties;
use crate::core::RecordId;
use crate::core::RecordKind;
use crate::core::StoredRecord;
use crate::core::TransactionRef;
use crate::interfaces::StoreError;
use crate::interfaces::TransactionalHandle;

// ============================================================================
// SECTION: State
// ============================================================================

/// Writes staged by the open transaction.
struct OpenTransaction {
    /// Transaction token value.
    id: u64,
    /// Staged record images; `None` marks a deletion.
    staged: BTreeMap<RecordId, Option<StoredRecord>>,
    /// Next identity to assign inside this transaction.
    next_id: u64,
}

/// Shared store state.
#[derive(Default)]
struct MemoryState {
    /// Committed records keyed by identity (identities increase on insert).
    records: BTreeMap<RecordId, StoredRecord>,
    /// Next committed identity.
    next_id: u64,
    /// Unique `(record_type, property)` pairs.
    unique: BTreeSet<(String, String)>,
    /// Currently open transaction.
    open: Option<OpenTransaction>,
    /// Last issued transaction token.
    last_tx: u64,
    /// Transactions begun.
    begins: u64,
    /// Transactions committed.
    commits: u64,
    /// Transactions rolled back, including failed commits.
    rollbacks: u64,
    /// Delay applied inside every commit.
    commit_delay: Option<Duration>,
    /// Fails the next commit when set.
    fail_next_commit: bool,
    /// Property value that aborts the open transaction when written.
    abort_on: Option<(String, Value)>,
}

impl MemoryState {
    /// Returns the open transaction matching `tx`.
    fn open_mut(&mut self, tx: &TransactionRef) -> Result<&mut OpenTransaction, StoreError> {
        match self.open.as_mut() {
            Some(open) if open.id == tx.get() => Ok(open),
            _ => Err(StoreError::Invalid(format!("transaction {} is not open", tx.get()))),
        }
    }

    /// Looks up a record as seen from inside the open transaction.
    fn visible(&self, id: RecordId) -> Option<&StoredRecord> {
        if let Some(open) = &self.open
            && let Some(staged) = open.staged.get(&id)
        {
            return staged.as_ref();
        }
        self.records.get(&id)
    }

    /// Iterates records as seen from inside the open transaction.
    fn visible_records(&self) -> impl Iterator<Item = &StoredRecord> {
        let staged = self.open.as_ref().map(|open| &open.staged);
        let committed = self
            .records
            .values()
            .filter(move |record| staged.is_none_or(|staged| !staged.contains_key(&record.id)));
        let fresh = staged.into_iter().flat_map(|staged| staged.values().flatten());
        committed.chain(fresh)
    }

    /// Rejects writes that would duplicate a unique property value.
    fn check_unique(&self, candidate: &StoredRecord) -> Result<(), StoreError> {
        for (key, value) in &candidate.properties {
            if !self.unique.contains(&(candidate.record_type.clone(), key.clone())) {
                continue;
            }
            let duplicate = self.visible_records().any(|other| {
                other.id != candidate.id
                    && other.record_type == candidate.record_type
                    && other.properties.get(key) == Some(value)
            });
            if duplicate {
                return Err(StoreError::Constraint(format!(
                    "duplicate value {value} for unique property {}.{key}",
                    candidate.record_type
                )));
            }
        }
        Ok(())
    }

    /// Aborts the transaction when the configured poison value is written.
    fn check_abort(&self, properties: &Properties) -> Result<(), StoreError> {
        match &self.abort_on {
            Some((key, value)) if properties.get(key) == Some(value) => Err(
                StoreError::TransactionAborted(format!("write of {key}={value} aborted the transaction")),
            ),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Transactional record store kept in memory.
///
/// # Invariants
/// - At most one transaction is open at a time.
/// - Staged writes become visible to probes only after commit.
#[derive(Default)]
pub struct InMemoryHandle {
    /// Shared state, also observed by probes.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryHandle {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a read-only observer of committed state.
    #[must_use]
    pub fn probe(&self) -> MemoryProbe {
        MemoryProbe {
            state: Arc::clone(&self.state),
        }
    }

    /// Declares `property` unique among records of `record_type`.
    pub fn declare_unique(&mut self, record_type: impl Into<String>, property: impl Into<String>) {
        self.lock().unique.insert((record_type.into(), property.into()));
    }

    /// Delays every commit by `delay`.
    pub fn set_commit_delay(&mut self, delay: Option<Duration>) {
        self.lock().commit_delay = delay;
    }

    /// Makes the next commit fail with an I/O error.
    pub fn fail_next_commit(&mut self) {
        self.lock().fail_next_commit = true;
    }

    /// Aborts the open transaction whenever `property` is written as `value`.
    pub fn abort_on_value(&mut self, property: impl Into<String>, value: Value) {
        self.lock().abort_on = Some((property.into(), value));
    }

    /// Returns a committed record.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<StoredRecord> {
        self.probe().get(id)
    }

    /// Counts committed records of `record_type`.
    #[must_use]
    pub fn count_type(&self, record_type: &str) -> usize {
        self.probe().count_type(record_type)
    }
}

impl TransactionalHandle for InMemoryHandle {
    fn begin(&mut self) -> Result<TransactionRef, StoreError> {
        let mut state = self.lock();
        if state.open.is_some() {
            return Err(StoreError::Conflict("a transaction is already open".to_string()));
        }
        state.last_tx = state.last_tx.saturating_add(1);
        state.begins = state.begins.saturating_add(1);
        let id = state.last_tx;
        let next_id = state.next_id;
        state.open = Some(OpenTransaction {
            id,
            staged: BTreeMap::new(),
            next_id,
        });
        Ok(TransactionRef::new(id))
    }

    fn commit(&mut self, tx: TransactionRef) -> Result<(), StoreError> {
        let delay = {
            let mut state = self.lock();
            state.open_mut(&tx)?;
            state.commit_delay
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let mut state = self.lock();
        let Some(open) = state.open.take() else {
            return Err(StoreError::Invalid(format!("transaction {} is not open", tx.get())));
        };
        if state.fail_next_commit {
            state.fail_next_commit = false;
            state.rollbacks = state.rollbacks.saturating_add(1);
            return Err(StoreError::Io("injected commit failure".to_string()));
        }
        for (id, image) in open.staged {
            match image {
                Some(record) => {
                    state.records.insert(id, record);
                }
                None => {
                    state.records.remove(&id);
                }
            }
        }
        state.next_id = open.next_id;
        state.commits = state.commits.saturating_add(1);
        Ok(())
    }

    fn rollback(&mut self, tx: TransactionRef) {
        let mut state = self.lock();
        if state.open.as_ref().is_some_and(|open| open.id == tx.get()) {
            state.open = None;
            state.rollbacks = state.rollbacks.saturating_add(1);
        }
    }

    fn create(
        &mut self,
        tx: &TransactionRef,
        record: &NewRecord,
    ) -> Result<StoredRecord, StoreError> {
        let mut state = self.lock();
        state.open_mut(tx)?;
        state.check_abort(&record.properties)?;
        if let Some(endpoints) = record.endpoints {
            for endpoint in [endpoints.from, endpoints.to] {
                match state.visible(endpoint) {
                    Some(found) if found.kind == RecordKind::Vertex => {}
                    Some(_) => {
                        return Err(StoreError::Invalid(format!(
                            "edge endpoint {endpoint} is not a vertex"
                        )));
                    }
                    None => return Err(StoreError::NotFound(endpoint)),
                }
            }
        }
        let open = state.open_mut(tx)?;
        let id = RecordId::from_raw(open.next_id.saturating_add(1));
        let stored = StoredRecord {
            id,
            kind: record.kind,
            record_type: record.record_type.clone(),
            properties: record.properties.clone(),
            endpoints: record.endpoints,
        };
        state.check_unique(&stored)?;
        let open = state.open_mut(tx)?;
        open.next_id = id.get();
        open.staged.insert(id, Some(stored.clone()));
        Ok(stored)
    }

    fn update(
        &mut self,
        tx: &TransactionRef,
        id: RecordId,
        changes: &Properties,
    ) -> Result<StoredRecord, StoreError> {
        let mut state = self.lock();
        state.open_mut(tx)?;
        state.check_abort(changes)?;
        let mut updated = state.visible(id).cloned().ok_or(StoreError::NotFound(id))?;
        updated.properties.extend(changes.iter().map(|(key, value)| (key.clone(), value.clone())));
        state.check_unique(&updated)?;
        state.open_mut(tx)?.staged.insert(id, Some(updated.clone()));
        Ok(updated)
    }

    fn delete(&mut self, tx: &TransactionRef, id: RecordId) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.open_mut(tx)?;
        if state.visible(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        state.open_mut(tx)?.staged.insert(id, None);
        Ok(())
    }
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Thread-safe observer of an [`InMemoryHandle`]'s committed state.
#[derive(Clone)]
pub struct MemoryProbe {
    /// Shared store state.
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProbe {
    /// Locks the store state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a committed record.
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<StoredRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// Counts committed records of `record_type`.
    #[must_use]
    pub fn count_type(&self, record_type: &str) -> usize {
        self.lock().records.values().filter(|record| record.record_type == record_type).count()
    }

    /// Lists committed records of `record_type` in insertion order.
    #[must_use]
    pub fn list_type(&self, record_type: &str) -> Vec<StoredRecord> {
        self.lock()
            .records
            .values()
            .filter(|record| record.record_type == record_type)
            .cloned()
            .collect()
    }

    /// Returns the total number of committed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns true when no records are committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Returns the number of transactions begun.
    #[must_use]
    pub fn begins(&self) -> u64 {
        self.lock().begins
    }

    /// Returns the number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.lock().commits
    }

    /// Returns the number of rolled-back transactions.
    #[must_use]
    pub fn rollbacks(&self) -> u64 {
        self.lock().rollbacks
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.lock().open.is_some()
    }
}
