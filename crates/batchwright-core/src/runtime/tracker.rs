// crates/batchwright-core/src/runtime/tracker.rs
// ============================================================================
// Module: Completion Tracker
// Description: Per-executor pending, success, and error accounting.
// Purpose: Let any thread poll or wait for drain without sharing live state.
// Dependencies: crate::core, std
// ============================================================================

//! ## Overview
//! Every accepted request is reserved before it is enqueued and released after
//! its window's bookkeeping and callbacks complete, so `pending == 0` implies
//! all submitted work has been recorded. Accessors return copies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use crate::core::FailedMutation;
use crate::core::MutationError;
use crate::core::RequestSummary;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Point-in-time copy of the completion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSnapshot {
    /// Requests accepted so far.
    pub submitted: u64,
    /// Requests accepted but not yet fully completed.
    pub pending: u64,
    /// Requests that succeeded.
    pub success_count: u64,
    /// Requests that failed.
    pub error_count: u64,
    /// Failed requests in completion order.
    pub errors: Vec<FailedMutation>,
}

impl CompletionSnapshot {
    /// Returns the number of completed requests.
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.success_count.saturating_add(self.error_count)
    }
}

// ============================================================================
// SECTION: Tracker
// ============================================================================

/// Mutable tracker state.
#[derive(Default)]
struct CompletionState {
    /// Requests accepted so far.
    submitted: u64,
    /// Requests not yet released.
    pending: u64,
    /// Successful requests.
    success_count: u64,
    /// Failed requests.
    error_count: u64,
    /// Failed requests in completion order.
    errors: Vec<FailedMutation>,
}

/// Thread-safe completion accounting shared by producers and workers.
///
/// # Invariants
/// - `success_count` and `error_count` never decrease.
/// - `pending` reaches zero only after results and callbacks are done.
#[derive(Default)]
pub(crate) struct CompletionTracker {
    /// Guarded counters.
    state: Mutex<CompletionState>,
    /// Signals waiters when `pending` reaches zero.
    drained: Condvar,
}

impl CompletionTracker {
    /// Locks the tracker state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, CompletionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves a pending slot ahead of enqueueing a request.
    pub(crate) fn reserve(&self) {
        let mut state = self.lock();
        state.submitted = state.submitted.saturating_add(1);
        state.pending = state.pending.saturating_add(1);
    }

    /// Returns a reservation whose request was never admitted.
    pub(crate) fn cancel_reservation(&self) {
        let mut state = self.lock();
        state.submitted = state.submitted.saturating_sub(1);
        state.pending = state.pending.saturating_sub(1);
        let drained = state.pending == 0;
        drop(state);
        if drained {
            self.drained.notify_all();
        }
    }

    /// Records the outcomes of one window in request order.
    pub(crate) fn record_window<'a, I>(&self, outcomes: I)
    where
        I: IntoIterator<Item = (&'a RequestSummary, Option<&'a MutationError>)>,
    {
        let mut state = self.lock();
        for (summary, error) in outcomes {
            match error {
                None => state.success_count = state.success_count.saturating_add(1),
                Some(error) => {
                    state.error_count = state.error_count.saturating_add(1);
                    state.errors.push(FailedMutation {
                        request: summary.clone(),
                        error: error.clone(),
                    });
                }
            }
        }
    }

    /// Releases `count` pending slots after a window completed.
    pub(crate) fn release(&self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(count);
        let drained = state.pending == 0;
        drop(state);
        if drained {
            self.drained.notify_all();
        }
    }

    /// Returns true while accepted work is incomplete.
    pub(crate) fn is_pending(&self) -> bool {
        self.lock().pending > 0
    }

    /// Blocks until no work is pending or `timeout` elapses.
    ///
    /// Returns whether the tracker drained.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.lock();
        while state.pending > 0 {
            match deadline {
                None => {
                    state = self.drained.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (next, _) = self
                        .drained
                        .wait_timeout(state, deadline.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner);
                    state = next;
                }
            }
        }
        true
    }

    /// Returns the success counter.
    pub(crate) fn success_count(&self) -> u64 {
        self.lock().success_count
    }

    /// Returns the error counter.
    pub(crate) fn error_count(&self) -> u64 {
        self.lock().error_count
    }

    /// Returns a copy of the error list.
    pub(crate) fn errors(&self) -> Vec<FailedMutation> {
        self.lock().errors.clone()
    }

    /// Returns a copy of every counter.
    pub(crate) fn snapshot(&self) -> CompletionSnapshot {
        let state = self.lock();
        CompletionSnapshot {
            submitted: state.submitted,
            pending: state.pending,
            success_count: state.success_count,
            error_count: state.error_count,
            errors: state.errors.clone(),
        }
    }
}
