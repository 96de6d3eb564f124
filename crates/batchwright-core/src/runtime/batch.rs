// crates/batchwright-core/src/runtime/batch.rs
// ============================================================================
// Module: Batch Facade
// Description: Scoped wrapper around a bulk executor bound to one handle.
// Purpose: Guarantee drain and worker shutdown when a batch scope ends.
// Dependencies: crate::core, crate::interfaces, crate::runtime, thiserror
// ============================================================================

//! ## Overview
//! A [`Batch`] claims its [`SharedHandle`] for the lifetime of the scope, so a
//! second batch on the same handle is rejected with
//! [`ExecutorError::NestedBatchNotSupported`] before any mutation runs.
//! Leaving the scope, by [`Batch::finish`], by [`scope`], or by drop during
//! unwinding, stops admission, waits for every accepted request, joins the
//! workers, and only then releases the claim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
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
use crate::interfaces::BatchClaim;
use crate::interfaces::SharedHandle;
use crate::interfaces::TransactionalHandle;
use crate::runtime::config::ExecutorConfig;
use crate::runtime::executor::BulkExecutor;
use crate::runtime::executor::ExecutorError;
use crate::runtime::telemetry::ExecutorMetrics;
use crate::runtime::telemetry::ExecutorStats;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure of a [`scope`] call.
///
/// # Invariants
/// - A cleanup failure always wins; the body error, if any, is attached.
#[derive(Debug, Error)]
pub enum ScopeError<E> {
    /// The batch could not be opened; the body never ran.
    #[error("batch scope could not be opened: {0}")]
    Open(ExecutorError),
    /// The body failed; cleanup completed normally.
    #[error("batch body failed: {0}")]
    Body(E),
    /// Cleanup failed, possibly after the body also failed.
    #[error("batch cleanup failed: {error}")]
    Cleanup {
        /// Cleanup failure.
        error: ExecutorError,
        /// Body failure observed before cleanup, if any.
        body: Option<E>,
    },
}

// ============================================================================
// SECTION: Progress and Report
// ============================================================================

/// Progress view of a batch.
///
/// Purely informational; it has no effect on scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchProgress {
    /// Expected number of requests, when announced via [`Batch::set_total`].
    pub total: Option<u64>,
    /// Requests completed so far.
    pub completed: u64,
    /// Requests that succeeded.
    pub succeeded: u64,
    /// Requests that failed.
    pub failed: u64,
    /// Caller-provided label.
    pub description: Option<String>,
}

impl BatchProgress {
    /// Returns the completed fraction of the announced total.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Progress fractions are approximate.")]
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.completed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Final accounting of a finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Requests accepted by the batch.
    pub submitted: u64,
    /// Requests that succeeded.
    pub succeeded: u64,
    /// Failed requests in completion order.
    pub errors: Vec<FailedMutation>,
    /// Executor diagnostics at shutdown.
    pub stats: ExecutorStats,
}

impl BatchReport {
    /// Returns the number of failed requests.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

// ============================================================================
// SECTION: Batch
// ============================================================================

/// Scoped bulk-write session on a shared handle.
///
/// # Invariants
/// - The handle claim outlives the executor's workers.
pub struct Batch<H: TransactionalHandle + 'static> {
    /// Underlying executor.
    executor: BulkExecutor<H>,
    /// Announced total for progress reporting.
    total: Option<u64>,
    /// Progress label.
    description: Option<String>,
    /// Set after cleanup ran.
    finished: bool,
    /// Handle claim; declared last so it is released after the executor.
    _claim: BatchClaim<H>,
}

impl<H: TransactionalHandle + 'static> Batch<H> {
    /// Opens a batch on `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NestedBatchNotSupported`] when a batch is
    /// already active on the handle, or [`ExecutorError::InvalidConfig`].
    pub fn open(handle: &SharedHandle<H>, config: ExecutorConfig) -> Result<Self, ExecutorError> {
        let claim = handle.claim_batch().ok_or(ExecutorError::NestedBatchNotSupported)?;
        let executor = BulkExecutor::with_config(handle.clone(), config)?;
        Ok(Self {
            executor,
            total: None,
            description: None,
            finished: false,
            _claim: claim,
        })
    }

    /// Returns the underlying executor.
    #[must_use]
    pub const fn executor(&self) -> &BulkExecutor<H> {
        &self.executor
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Sets the number of worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] after the first submission or for invalid values.
    pub fn set_parallel_level(&mut self, parallel_level: usize) -> Result<&mut Self, ExecutorError> {
        self.executor.set_parallel_level(parallel_level)?;
        Ok(self)
    }

    /// Sets the commit window size.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] after the first submission or for invalid values.
    pub fn set_commit_every(&mut self, commit_every: usize) -> Result<&mut Self, ExecutorError> {
        self.executor.set_commit_every(commit_every)?;
        Ok(self)
    }

    /// Sets the backpressure threshold.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] after the first submission or for invalid values.
    pub fn set_back_pressure(&mut self, threshold: usize) -> Result<&mut Self, ExecutorError> {
        self.executor.set_back_pressure(threshold)?;
        Ok(self)
    }

    /// Sets the idle-flush interval.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] after the first submission or for invalid values.
    pub fn set_flush_interval(&mut self, interval: Duration) -> Result<&mut Self, ExecutorError> {
        self.executor.set_flush_interval(interval)?;
        Ok(self)
    }

    /// Installs a callback for every completed request.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ConfigurationLocked`] after the first submission.
    pub fn set_global_callback<F>(&mut self, callback: F) -> Result<&mut Self, ExecutorError>
    where
        F: Fn(&RequestSummary, &MutationResult) + Send + Sync + 'static,
    {
        self.executor.set_global_callback(callback)?;
        Ok(self)
    }

    /// Installs a metrics sink.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ConfigurationLocked`] after the first submission.
    pub fn set_metrics(
        &mut self,
        metrics: Arc<dyn ExecutorMetrics>,
    ) -> Result<&mut Self, ExecutorError> {
        self.executor.set_metrics(metrics)?;
        Ok(self)
    }

    /// Announces the expected number of requests for progress reporting.
    pub const fn set_total(&mut self, total: u64) -> &mut Self {
        self.total = Some(total);
        self
    }

    /// Sets the progress label.
    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Submits a vertex creation.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] once the batch is finishing.
    pub fn create_vertex(
        &self,
        record_type: impl Into<String>,
        properties: Properties,
    ) -> Result<RequestId, ExecutorError> {
        self.executor.create(NewRecord::vertex(record_type, properties))
    }

    /// Submits a document creation.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] once the batch is finishing.
    pub fn create_document(
        &self,
        record_type: impl Into<String>,
        properties: Properties,
    ) -> Result<RequestId, ExecutorError> {
        self.executor.create(NewRecord::document(record_type, properties))
    }

    /// Submits an edge creation between two existing vertices.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] once the batch is finishing.
    pub fn create_edge(
        &self,
        record_type: impl Into<String>,
        from: RecordId,
        to: RecordId,
        properties: Properties,
    ) -> Result<RequestId, ExecutorError> {
        self.executor.create(NewRecord::edge(record_type, from, to, properties))
    }

    /// Submits a property update.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] once the batch is finishing.
    pub fn update_record(
        &self,
        id: RecordId,
        properties: Properties,
    ) -> Result<RequestId, ExecutorError> {
        self.executor.update(id, properties)
    }

    /// Submits a record deletion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] once the batch is finishing.
    pub fn delete_record(&self, id: RecordId) -> Result<RequestId, ExecutorError> {
        self.executor.delete(id)
    }

    /// Submits a prepared request.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutorClosed`] once the batch is finishing.
    pub fn submit(&self, request: MutationRequest) -> Result<RequestId, ExecutorError> {
        self.executor.submit(request)
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// Returns true while accepted work is incomplete.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.executor.is_pending()
    }

    /// Blocks until accepted work completes or `timeout` elapses.
    #[must_use]
    pub fn wait_completion(&self, timeout: Option<Duration>) -> bool {
        self.executor.wait_completion(timeout)
    }

    /// Returns the number of successful requests.
    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.executor.success_count()
    }

    /// Returns a copy of the failed requests.
    #[must_use]
    pub fn errors(&self) -> Vec<FailedMutation> {
        self.executor.errors()
    }

    /// Returns the current progress view.
    #[must_use]
    pub fn progress(&self) -> BatchProgress {
        let snapshot = self.executor.snapshot();
        BatchProgress {
            total: self.total,
            completed: snapshot.completed(),
            succeeded: snapshot.success_count,
            failed: snapshot.error_count,
            description: self.description.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Ends the batch and returns its final accounting.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::WorkerPanicked`] when a worker failed to join.
    pub fn finish(mut self) -> Result<BatchReport, ExecutorError> {
        self.cleanup()?;
        let snapshot = self.executor.snapshot();
        Ok(BatchReport {
            submitted: snapshot.submitted,
            succeeded: snapshot.success_count,
            errors: snapshot.errors,
            stats: self.executor.stats(),
        })
    }

    /// Stops admission, drains, and joins the workers once.
    fn cleanup(&mut self) -> Result<(), ExecutorError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.executor.close()?;
        let _ = self.executor.wait_completion(None);
        Ok(())
    }
}

impl<H: TransactionalHandle + 'static> Drop for Batch<H> {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Runs `body` inside a batch on `handle` and always cleans up.
///
/// Cleanup completes before the body's error is returned. When cleanup fails
/// the cleanup error is returned with the body's error attached.
///
/// # Errors
///
/// Returns [`ScopeError`] describing the open, body, or cleanup failure.
pub fn scope<H, T, E, F>(
    handle: &SharedHandle<H>,
    config: ExecutorConfig,
    body: F,
) -> Result<T, ScopeError<E>>
where
    H: TransactionalHandle + 'static,
    F: FnOnce(&mut Batch<H>) -> Result<T, E>,
{
    let mut batch = Batch::open(handle, config).map_err(ScopeError::Open)?;
    let outcome = body(&mut batch);
    let cleanup = batch.cleanup();
    drop(batch);
    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(error), Ok(())) => Err(ScopeError::Body(error)),
        (outcome, Err(error)) => Err(ScopeError::Cleanup {
            error,
            body: outcome.err(),
        }),
    }
}
