// crates/batchwright-core/src/runtime/worker.rs
// ============================================================================
// Module: Worker Pool
// Description: Worker threads that drain the queue into commit windows.
// Purpose: Apply mutations in bounded transactions and report their results.
// Dependencies: crate::core, crate::interfaces, crate::runtime, std
// ============================================================================

//! ## Overview
//! Each worker fills a commit window from the queue until it holds
//! `commit_every` requests, a pop idles for the flush interval, or the queue
//! closes. The window is then applied under the shared handle lock in one
//! `begin..commit` span. Per-request store errors are recorded and the window
//! continues; fatal errors roll the whole window back and mark every request
//! in it as [`MutationError::TransactionInvalidated`]. Bookkeeping and
//! callbacks run after the handle lock is released.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use crate::core::Mutation;
use crate::core::MutationError;
use crate::core::MutationOutcome;
use crate::core::MutationResult;
use crate::core::RequestSummary;
use crate::core::TransactionRef;
use crate::interfaces::SharedHandle;
use crate::interfaces::StoreError;
use crate::interfaces::TransactionalHandle;
use crate::runtime::ExecutorError;
use crate::runtime::queue::Pop;
use crate::runtime::queue::QueuedRequest;
use crate::runtime::queue::WorkQueue;
use crate::runtime::telemetry::ExecutorMetrics;
use crate::runtime::telemetry::WindowEvent;
use crate::runtime::telemetry::WindowOutcome;
use crate::runtime::telemetry::WindowStats;
use crate::runtime::tracker::CompletionTracker;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Callback invoked for every completed request across all workers.
///
/// Runs on a worker thread after the window's transaction has closed.
pub type GlobalCallback = Arc<dyn Fn(&RequestSummary, &MutationResult) + Send + Sync>;

/// Initial window allocation cap; windows grow past it on demand.
const WINDOW_PREALLOC_LIMIT: usize = 1_024;

/// State shared by every worker of one executor.
pub(crate) struct WorkerContext<H> {
    /// Store handle serialized across workers.
    pub(crate) handle: SharedHandle<H>,
    /// Queue drained by the workers.
    pub(crate) queue: Arc<WorkQueue>,
    /// Completion accounting.
    pub(crate) tracker: Arc<CompletionTracker>,
    /// Window counters.
    pub(crate) stats: Arc<Mutex<WindowStats>>,
    /// Metrics sink.
    pub(crate) metrics: Arc<dyn ExecutorMetrics>,
    /// Optional global callback.
    pub(crate) global_callback: Option<GlobalCallback>,
    /// Maximum requests per window.
    pub(crate) commit_every: usize,
    /// Idle time after which a partial window is flushed.
    pub(crate) flush_interval: Duration,
}

// ============================================================================
// SECTION: Worker Runtime
// ============================================================================

/// Spawns one named worker thread.
pub(crate) fn spawn_worker<H>(
    index: usize,
    context: Arc<WorkerContext<H>>,
) -> Result<JoinHandle<()>, ExecutorError>
where
    H: TransactionalHandle + 'static,
{
    thread::Builder::new()
        .name(format!("batchwright-worker-{index}"))
        .spawn(move || worker_loop(index, &context))
        .map_err(|err| ExecutorError::WorkerSpawn(format!("failed to spawn worker: {err}")))
}

/// Drains the queue into commit windows until it closes.
fn worker_loop<H: TransactionalHandle>(index: usize, context: &WorkerContext<H>) {
    loop {
        let first = match context.queue.pop(context.flush_interval) {
            Pop::Request(request) => request,
            Pop::Idle => continue,
            Pop::Closed => return,
        };
        let mut window = Vec::with_capacity(context.commit_every.min(WINDOW_PREALLOC_LIMIT));
        window.push(first);
        let mut closed = false;
        while window.len() < context.commit_every {
            match context.queue.pop(context.flush_interval) {
                Pop::Request(request) => window.push(request),
                Pop::Idle => break,
                Pop::Closed => {
                    closed = true;
                    break;
                }
            }
        }
        execute_window(index, context, window);
        if closed {
            return;
        }
    }
}

/// Per-request results of one window plus its transaction outcome.
struct AppliedWindow {
    /// Result for each request, in window order.
    results: Vec<MutationResult>,
    /// Whether the transaction committed.
    outcome: WindowOutcome,
    /// Time from `begin` until `commit` or `rollback` returned.
    commit_latency: Duration,
}

/// Applies one window and completes its bookkeeping.
fn execute_window<H: TransactionalHandle>(
    index: usize,
    context: &WorkerContext<H>,
    window: Vec<QueuedRequest>,
) {
    let size = window.len();
    let fill_wait = window.first().map_or(Duration::ZERO, |first| first.enqueued_at.elapsed());
    let AppliedWindow {
        results,
        outcome,
        commit_latency,
    } = apply_window(&context.handle, &window);

    context.tracker.record_window(
        window.iter().zip(&results).map(|(request, result)| (&request.summary, result.as_ref().err())),
    );
    let failed = results.iter().filter(|result| result.is_err()).count();

    let mut callback_panics = 0_u64;
    for (request, result) in window.into_iter().zip(&results) {
        if let Some(callback) = request.callback
            && catch_unwind(AssertUnwindSafe(|| callback(result))).is_err()
        {
            callback_panics = callback_panics.saturating_add(1);
        }
        if let Some(global) = &context.global_callback
            && catch_unwind(AssertUnwindSafe(|| global(&request.summary, result))).is_err()
        {
            callback_panics = callback_panics.saturating_add(1);
        }
    }

    let event = WindowEvent {
        worker: index,
        size,
        succeeded: size.saturating_sub(failed),
        failed,
        outcome,
        fill_wait,
        commit_latency,
    };
    let metrics_panicked =
        catch_unwind(AssertUnwindSafe(|| context.metrics.record_window(event))).is_err();
    {
        let mut stats = context.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.record_window(&event);
        stats.record_callback_panics(callback_panics);
        if metrics_panicked {
            stats.record_metrics_panic();
        }
    }
    context.tracker.release(size);
}

/// Runs a window inside one transaction under the handle lock.
///
/// A panic raised by the handle is caught while the lock is still held, so
/// the mutex is not poisoned; the open transaction is rolled back and the
/// window is invalidated.
fn apply_window<H: TransactionalHandle>(
    handle: &SharedHandle<H>,
    window: &[QueuedRequest],
) -> AppliedWindow {
    let rejected: Vec<Option<StoreError>> =
        window.iter().map(|request| prepare_mutation(&request.mutation)).collect();

    let mut guard = match handle.lock() {
        Ok(guard) => guard,
        Err(error) => {
            return AppliedWindow {
                results: invalidate_all(window.len(), &error),
                outcome: WindowOutcome::RolledBack,
                commit_latency: Duration::ZERO,
            };
        }
    };
    let started = Instant::now();
    let mut open_tx: Option<u64> = None;
    let run = catch_unwind(AssertUnwindSafe(|| {
        run_transaction(&mut *guard, window, rejected, &mut open_tx)
    }));
    let (results, outcome) = run.unwrap_or_else(|_| {
        if let Some(raw) = open_tx.take() {
            let _ = catch_unwind(AssertUnwindSafe(|| guard.rollback(TransactionRef::new(raw))));
        }
        let error = StoreError::Io("store handle panicked".to_string());
        (invalidate_all(window.len(), &error), WindowOutcome::RolledBack)
    });
    AppliedWindow {
        results,
        outcome,
        commit_latency: started.elapsed(),
    }
}

/// Begins, applies, and closes the window's transaction.
///
/// `open_tx` holds the raw token while the transaction is open.
fn run_transaction<H: TransactionalHandle>(
    handle: &mut H,
    window: &[QueuedRequest],
    rejected: Vec<Option<StoreError>>,
    open_tx: &mut Option<u64>,
) -> (Vec<MutationResult>, WindowOutcome) {
    let tx = match handle.begin() {
        Ok(tx) => tx,
        Err(error) => return (invalidate_all(window.len(), &error), WindowOutcome::RolledBack),
    };
    *open_tx = Some(tx.get());

    let mut results = Vec::with_capacity(window.len());
    for (request, rejection) in window.iter().zip(rejected) {
        if let Some(error) = rejection {
            results.push(Err(MutationError::Store(error)));
            continue;
        }
        match apply_mutation(handle, &tx, &request.mutation) {
            Ok(outcome) => results.push(Ok(outcome)),
            Err(error) if error.is_fatal() => {
                handle.rollback(tx);
                *open_tx = None;
                return (invalidate_all(window.len(), &error), WindowOutcome::RolledBack);
            }
            Err(error) => results.push(Err(MutationError::Store(error))),
        }
    }

    let committed = handle.commit(tx);
    *open_tx = None;
    match committed {
        Ok(()) => (results, WindowOutcome::Committed),
        Err(error) => (invalidate_all(window.len(), &error), WindowOutcome::RolledBack),
    }
}

/// Validates a mutation before the handle lock is taken.
fn prepare_mutation(mutation: &Mutation) -> Option<StoreError> {
    match mutation {
        Mutation::Create(record) => record.shape_error().map(StoreError::Invalid),
        Mutation::Update {
            ..
        }
        | Mutation::Delete {
            ..
        } => None,
    }
}

/// Applies a single mutation through the handle.
fn apply_mutation<H: TransactionalHandle>(
    handle: &mut H,
    tx: &TransactionRef,
    mutation: &Mutation,
) -> Result<MutationOutcome, StoreError> {
    match mutation {
        Mutation::Create(record) => handle.create(tx, record).map(MutationOutcome::Created),
        Mutation::Update {
            id,
            changes,
        } => handle.update(tx, *id, changes).map(MutationOutcome::Updated),
        Mutation::Delete {
            id,
        } => handle.delete(tx, *id).map(|()| MutationOutcome::Deleted(*id)),
    }
}

/// Builds the failure list for a rolled-back window.
fn invalidate_all(size: usize, error: &StoreError) -> Vec<MutationResult> {
    (0 .. size).map(|_| Err(MutationError::TransactionInvalidated(error.clone()))).collect()
}
