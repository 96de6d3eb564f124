// crates/batchwright-core/src/runtime/executor.rs
// ============================================================================
// Module: Bulk Executor
// Description: Producer-facing executor owning the queue, workers, and tracker.
// Purpose: Coordinate asynchronous bulk mutations against a shared handle.
// Dependencies: crate::core, crate::interfaces, crate::runtime, thiserror
// ============================================================================

//! ## Overview
//! [`BulkExecutor`] starts its worker pool lazily on the first submission.
//! Until then it can be reconfigured through the fluent setters; afterwards
//! configuration is locked. [`BulkExecutor::close`] stops admission, lets the
//! workers drain and commit everything already accepted, and joins them.
//! Dropping the executor closes it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;

use crate::core::FailedMutation;
use crate::core::MutationRequest;
use crate::core::MutationResult;
use crate::core::NewRecord;
use crate::core::Properties;
use crate::core::RecordId;
use crate::core::RequestId;
use crate::core::RequestSummary;
use crate::interfaces::SharedHandle;
use crate::interfaces::TransactionalHandle;
use crate::runtime::config::ExecutorConfig;
use crate::runtime::queue::WorkQueue;
use crate::runtime::telemetry::BackpressureEvent;
use crate::runtime::telemetry::ExecutorMetrics;
use crate::runtime::telemetry::ExecutorStats;
use crate::runtime::telemetry::NoopMetrics;
use crate::runtime::telemetry::WindowStats;
use crate::runtime::tracker::CompletionSnapshot;
use crate::runtime::tracker::CompletionTracker;
use crate::runtime::worker::GlobalCallback;
use crate::runtime::worker::WorkerContext;
use crate::runtime::worker::spawn_worker;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised synchronously by the executor and batch facade.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Submission attempted after `close`.
    #[error("executor is closed")]
    ExecutorClosed,
    /// A batch scope is already active on the same handle.
    #[error("nested batch scopes are not supported on the same handle")]
    NestedBatchNotSupported,
    /// Configuration changed after the first submission.
    #[error("executor configuration is locked after the first submission")]
    ConfigurationLocked,
    /// Configuration value out of range.
    #[error("invalid executor config: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be started.
    #[error("executor worker spawn failed: {0}")]
    WorkerSpawn(String),
    /// One or more worker threads panicked.
    #[error("executor worker panicked: {0}")]
    WorkerPanicked(String),
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Lifecycle state guarded by the executor.
#[derive(Default)]
struct Lifecycle {
    /// Running worker threads.
    workers: Vec<JoinHandle<()>>,
    /// Set once `close` has run.
    closed: bool,
}

/// Asynchronous bulk-write executor.
///
/// # Invariants
/// - Configuration is immutable once workers have started.
/// - Every accepted request is recorded as a success or an error before
///   `close` returns.
pub struct BulkExecutor<H: TransactionalHandle + 'static> {
    /// Shared store handle.
    handle: SharedHandle<H>,
    /// Executor configuration.
    config: ExecutorConfig,
    /// Optional callback for every completed request.
    global_callback: Option<GlobalCallback>,
    /// Metrics sink.
    metrics: Arc<dyn ExecutorMetrics>,
    /// Completion accounting.
    tracker: Arc<CompletionTracker>,
    /// Window counters.
    stats: Arc<Mutex<WindowStats>>,
    /// Work queue, created when workers start.
    queue: OnceLock<Arc<WorkQueue>>,
    /// Worker handles and closed flag.
    lifecycle: Mutex<Lifecycle>,
}

impl<H: TransactionalHandle + 'static> BulkExecutor<H> {
    /// Creates an executor with default configuration.
    #[must_use]
    pub fn new(handle: SharedHandle<H>) -> Self {
        Self {
            handle,
            config: ExecutorConfig::default(),
            global_callback: None,
            metrics: Arc::new(NoopMetrics),
            tracker: Arc::new(CompletionTracker::default()),
            stats: Arc::new(Mutex::new(WindowStats::default())),
            queue: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Creates an executor with a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidConfig`] when the configuration is invalid.
    pub fn with_config(
        handle: SharedHandle<H>,
        config: ExecutorConfig,
    ) -> Result<Self, ExecutorError> {
        config.validate()?;
        let mut executor = Self::new(handle);
        executor.config = config;
        Ok(executor)
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Returns the shared handle this executor writes through.
    #[must_use]
    pub const fn handle(&self) -> &SharedHandle<H> {
        &self.handle
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Sets the number of worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when workers already started or the value is invalid.
    pub fn set_parallel_level(&mut self, parallel_level: usize) -> Result<&mut Self, ExecutorError> {
        self.reconfigure(|config| config.parallel_level = parallel_level)
    }

    /// Sets the number of requests committed per transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when workers already started or the value is invalid.
    pub fn set_commit_every(&mut self, commit_every: usize) -> Result<&mut Self, ExecutorError> {
        self.reconfigure(|config| config.commit_every = commit_every)
    }

    /// Sets the queue depth at which producers block.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when workers already started or the value is invalid.
    pub fn set_back_pressure(&mut self, threshold: usize) -> Result<&mut Self, ExecutorError> {
        self.reconfigure(|config| config.back_pressure_threshold = Some(threshold))
    }

    /// Sets the idle time after which partial windows are committed.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when workers already started or the value is invalid.
    pub fn set_flush_interval(&mut self, interval: Duration) -> Result<&mut Self, ExecutorError> {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.reconfigure(|config| config.flush_interval_ms = millis)
    }

    /// Installs a callback invoked for every completed request.
    ///
    /// The callback runs on worker threads; keep it fast and non-blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when workers already started.
    pub fn set_global_callback<F>(&mut self, callback: F) -> Result<&mut Self, ExecutorError>
    where
        F: Fn(&RequestSummary, &MutationResult) + Send + Sync + 'static,
    {
        self.ensure_configurable()?;
        self.global_callback = Some(Arc::new(callback));
        Ok(self)
    }

    /// Installs a metrics sink.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when workers already started.
    pub fn set_metrics(
        &mut self,
        metrics: Arc<dyn ExecutorMetrics>,
    ) -> Result<&mut Self, ExecutorError> {
        self.ensure_configurable()?;
        self.metrics = metrics;
        Ok(self)
    }

    /// Applies and validates a configuration change.
    fn reconfigure(
        &mut self,
        change: impl FnOnce(&mut ExecutorConfig),
    ) -> Result<&mut Self, ExecutorError> {
        self.ensure_configurable()?;
        let mut next = self.config.clone();
        change(&mut next);
        next.validate()?;
        self.config = next;
        Ok(self)
    }

    /// Rejects configuration after start or close.
    fn ensure_configurable(&mut self) -> Result<(), ExecutorError> {
        if self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner).closed {
            return Err(ExecutorError::ExecutorClosed);
        }
        if self.queue.get().is_some() {
            return Err(ExecutorError::ConfigurationLocked);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Submits a request, blocking while backpressure is engaged.
    ///
    /// Store failures are not returned here; they are recorded and surface
    /// through [`BulkExecutor::errors`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] after `close`, or a spawn
    /// error when the worker pool cannot start.
    pub fn submit(&self, request: MutationRequest) -> Result<RequestId, ExecutorError> {
        let queue = self.ensure_started()?;
        self.tracker.reserve();
        match queue.push(request) {
            Ok(admission) => {
                if let Some(blocked) = admission.blocked {
                    let event = BackpressureEvent {
                        blocked,
                        depth: admission.depth,
                    };
                    if catch_unwind(AssertUnwindSafe(|| self.metrics.record_backpressure(event)))
                        .is_err()
                    {
                        self.stats.lock().unwrap_or_else(PoisonError::into_inner).record_metrics_panic();
                    }
                }
                Ok(admission.id)
            }
            Err(error) => {
                self.tracker.cancel_reservation();
                Err(error)
            }
        }
    }

    /// Submits a record creation.
    ///
    /// # Errors
    ///
    /// See [`BulkExecutor::submit`].
    pub fn create(&self, record: NewRecord) -> Result<RequestId, ExecutorError> {
        self.submit(MutationRequest::create(record))
    }

    /// Submits a property update.
    ///
    /// # Errors
    ///
    /// See [`BulkExecutor::submit`].
    pub fn update(&self, id: RecordId, changes: Properties) -> Result<RequestId, ExecutorError> {
        self.submit(MutationRequest::update(id, changes))
    }

    /// Submits a record deletion.
    ///
    /// # Errors
    ///
    /// See [`BulkExecutor::submit`].
    pub fn delete(&self, id: RecordId) -> Result<RequestId, ExecutorError> {
        self.submit(MutationRequest::delete(id))
    }

    /// Locks the lifecycle state, recovering from poisoning.
    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the queue, starting the worker pool on first use.
    fn ensure_started(&self) -> Result<&Arc<WorkQueue>, ExecutorError> {
        if let Some(queue) = self.queue.get() {
            return Ok(queue);
        }
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.closed {
            return Err(ExecutorError::ExecutorClosed);
        }
        if let Some(queue) = self.queue.get() {
            return Ok(queue);
        }

        let queue = Arc::new(WorkQueue::new(
            self.config.back_pressure_threshold,
            self.config.resume_depth(),
        ));
        let context = Arc::new(WorkerContext {
            handle: self.handle.clone(),
            queue: Arc::clone(&queue),
            tracker: Arc::clone(&self.tracker),
            stats: Arc::clone(&self.stats),
            metrics: Arc::clone(&self.metrics),
            global_callback: self.global_callback.clone(),
            commit_every: self.config.commit_every,
            flush_interval: self.config.flush_interval(),
        });
        let mut workers = Vec::with_capacity(self.config.parallel_level);
        for index in 0 .. self.config.parallel_level {
            match spawn_worker(index, Arc::clone(&context)) {
                Ok(worker) => workers.push(worker),
                Err(error) => {
                    queue.close();
                    let _ = join_workers(workers);
                    lifecycle.closed = true;
                    return Err(error);
                }
            }
        }
        lifecycle.workers = workers;
        let queue = self.queue.get_or_init(|| queue);
        drop(lifecycle);
        Ok(queue)
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// Returns the number of requests waiting for a worker.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue.get().map_or(0, |queue| queue.depth())
    }

    /// Returns true while any accepted request is not yet completed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.tracker.is_pending()
    }

    /// Blocks until all accepted requests complete or `timeout` elapses.
    ///
    /// Returns whether completion was reached. A timeout cancels nothing.
    #[must_use]
    pub fn wait_completion(&self, timeout: Option<Duration>) -> bool {
        self.tracker.wait(timeout)
    }

    /// Returns the number of successful requests.
    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.tracker.success_count()
    }

    /// Returns the number of failed requests.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.tracker.error_count()
    }

    /// Returns a copy of the failed requests in completion order.
    #[must_use]
    pub fn errors(&self) -> Vec<FailedMutation> {
        self.tracker.errors()
    }

    /// Returns a copy of all completion counters.
    #[must_use]
    pub fn snapshot(&self) -> CompletionSnapshot {
        self.tracker.snapshot()
    }

    /// Returns executor diagnostics.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        let gate = self.queue.get().map(|queue| queue.gate_stats()).unwrap_or_default();
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).snapshot(
            gate.peak_depth,
            gate.producer_blocks,
            gate.blocked_time,
        )
    }

    /// Returns true once `close` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock_lifecycle().closed
            || self.queue.get().is_some_and(|queue| queue.is_closed())
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Stops admission, drains and commits accepted work, and joins workers.
    ///
    /// Idempotent: later calls return `Ok(())` without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::WorkerPanicked`] from the first call when a
    /// worker thread panicked.
    pub fn close(&self) -> Result<(), ExecutorError> {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.closed {
            return Ok(());
        }
        lifecycle.closed = true;
        if let Some(queue) = self.queue.get() {
            queue.close();
        }
        let workers = std::mem::take(&mut lifecycle.workers);
        let result = join_workers(workers);
        drop(lifecycle);
        result
    }
}

impl<H: TransactionalHandle + 'static> Drop for BulkExecutor<H> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Joins worker threads, reporting how many panicked.
fn join_workers(workers: Vec<JoinHandle<()>>) -> Result<(), ExecutorError> {
    let total = workers.len();
    let panicked = workers.into_iter().map(JoinHandle::join).filter(Result::is_err).count();
    if panicked == 0 {
        Ok(())
    } else {
        Err(ExecutorError::WorkerPanicked(format!("{panicked} of {total} workers panicked")))
    }
}
