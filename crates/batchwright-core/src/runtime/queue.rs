// crates/batchwright-core/src/runtime/queue.rs
// ============================================================================
// Module: Work Queue
// Description: FIFO of pending mutation requests with a backpressure gate.
// Purpose: Hand requests from producers to workers with bounded depth.
// Dependencies: crate::core, std
// ============================================================================

//! ## Overview
//! The queue is a mutex-guarded `VecDeque` with two condition variables: one
//! wakes workers when requests arrive, the other wakes producers when the
//! backpressure gate reopens. The gate engages when depth reaches the
//! threshold and stays engaged until depth falls to the resume depth.
//! Submission order is the order of [`RequestId`] assignment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use crate::core::Mutation;
use crate::core::MutationRequest;
use crate::core::RequestCallback;
use crate::core::RequestId;
use crate::core::RequestSummary;
use crate::runtime::ExecutorError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request owned by the queue until a worker pops it.
pub(crate) struct QueuedRequest {
    /// Payload-free summary.
    pub(crate) summary: RequestSummary,
    /// Mutation to apply.
    pub(crate) mutation: Mutation,
    /// Per-request callback.
    pub(crate) callback: Option<RequestCallback>,
    /// Enqueue timestamp used to derive queue wait.
    pub(crate) enqueued_at: Instant,
}

/// Result of a blocking pop.
pub(crate) enum Pop {
    /// A request was dequeued.
    Request(QueuedRequest),
    /// No request arrived before the timeout.
    Idle,
    /// The queue is closed and fully drained.
    Closed,
}

/// Successful admission of a request.
pub(crate) struct Admission {
    /// Assigned request identifier.
    pub(crate) id: RequestId,
    /// Time spent blocked at the gate, if the producer had to wait.
    pub(crate) blocked: Option<Duration>,
    /// Queue depth right after the push.
    pub(crate) depth: usize,
}

/// Point-in-time gate statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GateStats {
    /// Highest depth observed.
    pub(crate) peak_depth: usize,
    /// Number of submissions that had to wait.
    pub(crate) producer_blocks: u64,
    /// Total time producers spent waiting.
    pub(crate) blocked_time: Duration,
}

/// Mutable queue state.
struct QueueState {
    /// Pending requests in submission order.
    items: VecDeque<QueuedRequest>,
    /// Last assigned sequence number.
    last_sequence: u64,
    /// Set once the queue stops accepting requests.
    closed: bool,
    /// Set while producers must wait for the depth to fall.
    gate_engaged: bool,
    /// Gate statistics.
    stats: GateStats,
}

// ============================================================================
// SECTION: Work Queue
// ============================================================================

/// Thread-safe FIFO shared by producers and workers.
///
/// # Invariants
/// - Depth never exceeds the backpressure threshold when one is configured.
/// - Requests accepted before `close` are still handed out after it.
pub(crate) struct WorkQueue {
    /// Guarded queue state.
    state: Mutex<QueueState>,
    /// Signals workers that a request is available or the queue closed.
    not_empty: Condvar,
    /// Signals producers that the gate reopened or the queue closed.
    admission: Condvar,
    /// Depth at which the gate engages.
    threshold: Option<usize>,
    /// Depth at or below which the gate disengages.
    resume_depth: usize,
}

impl WorkQueue {
    /// Creates a queue with an optional backpressure threshold.
    pub(crate) fn new(threshold: Option<usize>, resume_depth: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                last_sequence: 0,
                closed: false,
                gate_engaged: false,
                stats: GateStats::default(),
            }),
            not_empty: Condvar::new(),
            admission: Condvar::new(),
            threshold,
            resume_depth: resume_depth.unwrap_or(0),
        }
    }

    /// Locks the queue state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a request, blocking while the backpressure gate is engaged.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] when the queue is closed
    /// before the request is admitted.
    pub(crate) fn push(&self, request: MutationRequest) -> Result<Admission, ExecutorError> {
        let mut state = self.lock();
        let mut blocked_since: Option<Instant> = None;
        loop {
            if state.closed {
                if let Some(started) = blocked_since {
                    state.stats.blocked_time =
                        state.stats.blocked_time.saturating_add(started.elapsed());
                }
                return Err(ExecutorError::ExecutorClosed);
            }
            if !self.gate_blocks(&state) {
                break;
            }
            if blocked_since.is_none() {
                blocked_since = Some(Instant::now());
                state.stats.producer_blocks = state.stats.producer_blocks.saturating_add(1);
            }
            state = self.admission.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        let blocked = blocked_since.map(|started| started.elapsed());
        if let Some(waited) = blocked {
            state.stats.blocked_time = state.stats.blocked_time.saturating_add(waited);
        }

        state.last_sequence = state.last_sequence.saturating_add(1);
        let id = RequestId::from_raw(state.last_sequence);
        let MutationRequest {
            mutation,
            callback,
        } = request;
        state.items.push_back(QueuedRequest {
            summary: RequestSummary::of(id, &mutation),
            mutation,
            callback,
            enqueued_at: Instant::now(),
        });
        let depth = state.items.len();
        state.stats.peak_depth = state.stats.peak_depth.max(depth);
        if let Some(threshold) = self.threshold
            && depth >= threshold
        {
            state.gate_engaged = true;
        }
        drop(state);
        self.not_empty.notify_one();
        Ok(Admission {
            id,
            blocked,
            depth,
        })
    }

    /// Returns true when a producer must wait before pushing.
    fn gate_blocks(&self, state: &QueueState) -> bool {
        self.threshold
            .is_some_and(|threshold| state.gate_engaged || state.items.len() >= threshold)
    }

    /// Dequeues the next request, waiting up to `timeout` for one to arrive.
    pub(crate) fn pop(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(request) = state.items.pop_front() {
                if state.gate_engaged && state.items.len() <= self.resume_depth {
                    state.gate_engaged = false;
                    drop(state);
                    self.admission.notify_all();
                }
                return Pop::Request(request);
            }
            if state.closed {
                return Pop::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return Pop::Idle;
            }
            let (next, _) = self
                .not_empty
                .wait_timeout(state, deadline.saturating_duration_since(now))
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    /// Stops accepting requests and wakes every waiter.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.admission.notify_all();
    }

    /// Returns true once the queue has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns the number of requests waiting for a worker.
    pub(crate) fn depth(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns a copy of the gate statistics.
    pub(crate) fn gate_stats(&self) -> GateStats {
        self.lock().stats
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    //! Queue-level tests for ordering, gating, and close semantics.
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::core::MutationRequest;
    use crate::core::RecordId;

    fn delete(raw: u64) -> MutationRequest {
        MutationRequest::delete(RecordId::from_raw(raw))
    }

    fn popped_id(pop: Pop) -> u64 {
        match pop {
            Pop::Request(request) => request.summary.id.get(),
            Pop::Idle => panic!("unexpected idle pop"),
            Pop::Closed => panic!("unexpected closed pop"),
        }
    }

    #[test]
    fn pop_returns_requests_in_submission_order() {
        let queue = WorkQueue::new(None, None);
        for raw in 1 ..= 3 {
            queue.push(delete(raw)).unwrap();
        }
        let ids: Vec<u64> =
            (0 .. 3).map(|_| popped_id(queue.pop(Duration::from_millis(10)))).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn pop_idles_on_empty_queue() {
        let queue = WorkQueue::new(None, None);
        assert!(matches!(queue.pop(Duration::from_millis(5)), Pop::Idle));
    }

    #[test]
    fn close_drains_remaining_requests_before_reporting_closed() {
        let queue = WorkQueue::new(None, None);
        queue.push(delete(1)).unwrap();
        queue.close();
        assert!(matches!(queue.push(delete(2)), Err(ExecutorError::ExecutorClosed)));
        assert_eq!(popped_id(queue.pop(Duration::from_millis(5))), 1);
        assert!(matches!(queue.pop(Duration::from_millis(5)), Pop::Closed));
    }

    #[test]
    fn gate_holds_producer_until_resume_depth() {
        let queue = Arc::new(WorkQueue::new(Some(5), Some(4)));
        for raw in 0 .. 5 {
            queue.push(delete(raw)).unwrap();
        }
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(delete(99)).map(|admission| admission.blocked))
        };
        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.depth(), 5);
        let _ = queue.pop(Duration::from_millis(5));
        let blocked = producer.join().unwrap().unwrap();
        assert!(blocked.is_some());
        assert_eq!(queue.gate_stats().peak_depth, 5);
        assert_eq!(queue.gate_stats().producer_blocks, 1);
    }

    #[test]
    fn gate_stays_engaged_until_depth_falls_to_resume_watermark() {
        let queue = Arc::new(WorkQueue::new(Some(10), Some(8)));
        for raw in 0 .. 10 {
            queue.push(delete(raw)).unwrap();
        }
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(delete(99)).map(|admission| admission.blocked))
        };
        thread::sleep(Duration::from_millis(30));
        let _ = queue.pop(Duration::from_millis(5));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(queue.depth(), 9);
        assert!(!producer.is_finished());

        let _ = queue.pop(Duration::from_millis(5));
        let blocked = producer.join().unwrap().unwrap();
        assert!(blocked.is_some());
        assert_eq!(queue.depth(), 9);
        assert_eq!(queue.gate_stats().producer_blocks, 1);
    }

    #[test]
    fn close_releases_blocked_producers() {
        let queue = Arc::new(WorkQueue::new(Some(1), Some(0)));
        queue.push(delete(1)).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(delete(2)).map(|admission| admission.id))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(matches!(producer.join().unwrap(), Err(ExecutorError::ExecutorClosed)));
    }
}
