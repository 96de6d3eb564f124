// crates/batchwright-core/src/runtime/telemetry.rs
// ============================================================================
// Module: Executor Telemetry
// Description: Metric events, a JSON-lines event sink, and executor stats.
// Purpose: Observe windows and backpressure without hard logging deps.
// Dependencies: serde, serde_json, std
// ============================================================================

//! ## Overview
//! Workers report every closed window and producers report every gate wait
//! through [`ExecutorMetrics`]. [`JsonLinesMetrics`] writes those events as
//! one JSON object per line; [`NoopMetrics`] discards them. Independently the
//! executor keeps bucketed counters exposed as an [`ExecutorStats`] snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bucket boundaries used for commit window size histograms.
pub const WINDOW_SIZE_BUCKETS: [u64; 10] = [1, 2, 4, 8, 16, 64, 256, 1_024, 4_096, 16_384];
/// Microsecond bucket boundaries used for commit latency histograms.
pub const COMMIT_LATENCY_BUCKETS_US: [u64; 10] =
    [100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000];

// ============================================================================
// SECTION: Events
// ============================================================================

/// How a commit window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowOutcome {
    /// The window's transaction committed.
    Committed,
    /// The window's transaction was rolled back.
    RolledBack,
}

impl WindowOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Event emitted when a worker closes a commit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEvent {
    /// Worker index.
    pub worker: usize,
    /// Number of requests in the window.
    pub size: usize,
    /// Requests recorded as successful.
    pub succeeded: usize,
    /// Requests recorded as failed.
    pub failed: usize,
    /// Window outcome.
    pub outcome: WindowOutcome,
    /// Time from the first request's enqueue to window execution.
    pub fill_wait: Duration,
    /// Time spent between `begin` and `commit`/`rollback`.
    pub commit_latency: Duration,
}

/// Event emitted when a producer had to wait at the backpressure gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureEvent {
    /// Time the producer was blocked.
    pub blocked: Duration,
    /// Queue depth after the request was admitted.
    pub depth: usize,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for executor activity.
///
/// Calls happen on worker and producer threads; implementations must not block.
pub trait ExecutorMetrics: Send + Sync {
    /// Records a closed commit window.
    fn record_window(&self, event: WindowEvent);
    /// Records a producer wait at the backpressure gate.
    fn record_backpressure(&self, event: BackpressureEvent);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl ExecutorMetrics for NoopMetrics {
    fn record_window(&self, _event: WindowEvent) {}

    fn record_backpressure(&self, _event: BackpressureEvent) {}
}

/// Metrics sink that writes one JSON object per event.
pub struct JsonLinesMetrics<W: Write + Send> {
    /// Output writer for event records.
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesMetrics<W> {
    /// Creates a sink writing to `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a single record; write failures are dropped.
    fn write_record(&self, record: &serde_json::Value) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *guard, record).is_ok() {
            let _ = guard.write_all(b"\n");
        }
    }
}

impl<W: Write + Send> ExecutorMetrics for JsonLinesMetrics<W> {
    fn record_window(&self, event: WindowEvent) {
        self.write_record(&json!({
            "event": "window",
            "worker": event.worker,
            "size": event.size,
            "succeeded": event.succeeded,
            "failed": event.failed,
            "outcome": event.outcome.as_str(),
            "fill_wait_us": duration_us(event.fill_wait),
            "commit_latency_us": duration_us(event.commit_latency),
        }));
    }

    fn record_backpressure(&self, event: BackpressureEvent) {
        self.write_record(&json!({
            "event": "backpressure",
            "blocked_us": duration_us(event.blocked),
            "depth": event.depth,
        }));
    }
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Snapshot of executor diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    /// Windows whose transaction committed.
    pub windows_committed: u64,
    /// Windows whose transaction was rolled back.
    pub windows_rolled_back: u64,
    /// Requests taken off the queue by workers.
    pub requests_processed: u64,
    /// Window-size bucket boundaries.
    pub window_size_buckets: Vec<u64>,
    /// Window-size histogram counts (length = `window_size_buckets.len() + 1`).
    pub window_size_histogram: Vec<u64>,
    /// Window-size p50 estimate from histogram.
    pub window_size_p50: u64,
    /// Window-size p95 estimate from histogram.
    pub window_size_p95: u64,
    /// Commit latency bucket boundaries in microseconds.
    pub commit_latency_buckets_us: Vec<u64>,
    /// Commit latency histogram counts.
    pub commit_latency_histogram_us: Vec<u64>,
    /// Commit latency p50 estimate in microseconds.
    pub commit_latency_p50_us: u64,
    /// Commit latency p95 estimate in microseconds.
    pub commit_latency_p95_us: u64,
    /// Highest queue depth observed.
    pub peak_queue_depth: usize,
    /// Submissions that waited at the backpressure gate.
    pub producer_blocks: u64,
    /// Total producer wait at the gate in milliseconds.
    pub producer_blocked_ms: u64,
    /// Callbacks that panicked on a worker thread.
    pub callback_panics: u64,
    /// Metrics sink calls that panicked.
    pub metrics_panics: u64,
}

/// Counters updated by workers.
pub(crate) struct WindowStats {
    /// Committed windows.
    windows_committed: u64,
    /// Rolled-back windows.
    windows_rolled_back: u64,
    /// Requests processed.
    requests_processed: u64,
    /// Window size histogram.
    window_size_histogram: [u64; WINDOW_SIZE_BUCKETS.len() + 1],
    /// Commit latency histogram in microseconds.
    commit_latency_histogram_us: [u64; COMMIT_LATENCY_BUCKETS_US.len() + 1],
    /// Callback panics.
    callback_panics: u64,
    /// Metrics sink panics.
    metrics_panics: u64,
}

impl Default for WindowStats {
    fn default() -> Self {
        Self {
            windows_committed: 0,
            windows_rolled_back: 0,
            requests_processed: 0,
            window_size_histogram: [0; WINDOW_SIZE_BUCKETS.len() + 1],
            commit_latency_histogram_us: [0; COMMIT_LATENCY_BUCKETS_US.len() + 1],
            callback_panics: 0,
            metrics_panics: 0,
        }
    }
}

impl WindowStats {
    /// Folds a closed window into the counters.
    pub(crate) fn record_window(&mut self, event: &WindowEvent) {
        match event.outcome {
            WindowOutcome::Committed => {
                self.windows_committed = self.windows_committed.saturating_add(1);
            }
            WindowOutcome::RolledBack => {
                self.windows_rolled_back = self.windows_rolled_back.saturating_add(1);
            }
        }
        let size = u64::try_from(event.size).unwrap_or(u64::MAX);
        self.requests_processed = self.requests_processed.saturating_add(size);
        let size_bucket = histogram_bucket_index_from_bounds(&WINDOW_SIZE_BUCKETS, size);
        if let Some(slot) = self.window_size_histogram.get_mut(size_bucket) {
            *slot = slot.saturating_add(1);
        }
        let latency_bucket = histogram_bucket_index_from_bounds(
            &COMMIT_LATENCY_BUCKETS_US,
            duration_us(event.commit_latency),
        );
        if let Some(slot) = self.commit_latency_histogram_us.get_mut(latency_bucket) {
            *slot = slot.saturating_add(1);
        }
    }

    /// Counts callback panics caught on a worker.
    pub(crate) fn record_callback_panics(&mut self, count: u64) {
        self.callback_panics = self.callback_panics.saturating_add(count);
    }

    /// Counts a panic raised by the metrics sink.
    pub(crate) fn record_metrics_panic(&mut self) {
        self.metrics_panics = self.metrics_panics.saturating_add(1);
    }

    /// Builds the public snapshot, merging in gate statistics.
    pub(crate) fn snapshot(
        &self,
        peak_queue_depth: usize,
        producer_blocks: u64,
        producer_blocked: Duration,
    ) -> ExecutorStats {
        ExecutorStats {
            windows_committed: self.windows_committed,
            windows_rolled_back: self.windows_rolled_back,
            requests_processed: self.requests_processed,
            window_size_buckets: WINDOW_SIZE_BUCKETS.to_vec(),
            window_size_histogram: self.window_size_histogram.to_vec(),
            window_size_p50: histogram_percentile(
                &WINDOW_SIZE_BUCKETS,
                &self.window_size_histogram,
                50,
            ),
            window_size_p95: histogram_percentile(
                &WINDOW_SIZE_BUCKETS,
                &self.window_size_histogram,
                95,
            ),
            commit_latency_buckets_us: COMMIT_LATENCY_BUCKETS_US.to_vec(),
            commit_latency_histogram_us: self.commit_latency_histogram_us.to_vec(),
            commit_latency_p50_us: histogram_percentile(
                &COMMIT_LATENCY_BUCKETS_US,
                &self.commit_latency_histogram_us,
                50,
            ),
            commit_latency_p95_us: histogram_percentile(
                &COMMIT_LATENCY_BUCKETS_US,
                &self.commit_latency_histogram_us,
                95,
            ),
            peak_queue_depth,
            producer_blocks,
            producer_blocked_ms: u64::try_from(producer_blocked.as_millis()).unwrap_or(u64::MAX),
            callback_panics: self.callback_panics,
            metrics_panics: self.metrics_panics,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a duration to whole microseconds, saturating.
pub(crate) fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Returns bucket index for `value` against sorted histogram bounds.
fn histogram_bucket_index_from_bounds(bounds: &[u64], value: u64) -> usize {
    for (idx, upper_bound) in bounds.iter().enumerate() {
        if value <= *upper_bound {
            return idx;
        }
    }
    bounds.len()
}

/// Computes approximate percentile value from bucketed histogram counts.
fn histogram_percentile(bounds: &[u64], counts: &[u64], percentile: u32) -> u64 {
    if percentile == 0 || percentile > 100 || counts.is_empty() || bounds.is_empty() {
        return 0;
    }
    let total = counts.iter().fold(0_u64, |acc, value| acc.saturating_add(*value));
    if total == 0 {
        return 0;
    }
    let rank =
        total.saturating_mul(u64::from(percentile)).saturating_add(99).saturating_div(100).max(1);
    let mut running = 0_u64;
    for (idx, count) in counts.iter().enumerate() {
        running = running.saturating_add(*count);
        if running >= rank {
            return bounds.get(idx).or_else(|| bounds.last()).copied().unwrap_or(0);
        }
    }
    bounds.last().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    //! Histogram helper tests.

    use super::*;

    #[test]
    fn percentile_uses_bucket_upper_bounds() {
        let bounds = [1, 10, 100];
        let counts = [0, 9, 1, 0];
        assert_eq!(histogram_percentile(&bounds, &counts, 50), 10);
        assert_eq!(histogram_percentile(&bounds, &counts, 100), 100);
        assert_eq!(histogram_percentile(&bounds, &[0, 0, 0, 0], 50), 0);
    }

    #[test]
    fn overflow_values_land_in_last_bucket() {
        assert_eq!(histogram_bucket_index_from_bounds(&[1, 2], 3), 2);
        assert_eq!(histogram_bucket_index_from_bounds(&[1, 2], 2), 1);
    }
}
