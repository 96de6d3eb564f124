// crates/batchwright-core/tests/telemetry.rs
// ============================================================================
// Module: Executor Telemetry Tests
// Description: JSON-lines event output and executor stats snapshots.
// Purpose: Validate structured window records and histogram accounting.
// Dependencies: batchwright-core, serde_json
// ============================================================================
//! ## Overview
//! Captures [`JsonLinesMetrics`] output into a shared buffer and checks the
//! emitted records against the executor's own counters.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use batchwright_core::BackpressureEvent;
use batchwright_core::BulkExecutor;
use batchwright_core::ExecutorConfig;
use batchwright_core::ExecutorMetrics;
use batchwright_core::InMemoryHandle;
use batchwright_core::JsonLinesMetrics;
use batchwright_core::NewRecord;
use batchwright_core::SharedHandle;
use batchwright_core::WindowEvent;
use batchwright_core::properties;
use serde_json::Value;
use serde_json::json;

/// Writer that appends into a buffer shared with the test.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

#[test]
fn window_events_are_written_as_json_lines() {
    let mut handle = InMemoryHandle::new();
    handle.abort_on_value("poison", json!(1));
    let buffer = SharedBuffer::default();
    let config = ExecutorConfig {
        commit_every: 3,
        flush_interval_ms: 30_000,
        ..ExecutorConfig::default()
    };
    let mut executor = BulkExecutor::with_config(SharedHandle::new(handle), config).unwrap();
    executor.set_metrics(Arc::new(JsonLinesMetrics::new(buffer.clone()))).unwrap();

    for seq in 0 .. 9 {
        let poison = if seq == 4 { 1 } else { 0 };
        let record =
            NewRecord::vertex("Item", properties([("seq", json!(seq)), ("poison", json!(poison))]));
        executor.create(record).unwrap();
    }
    executor.close().unwrap();

    let records = buffer.records();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record["event"], "window");
        assert_eq!(record["worker"], 0);
        assert_eq!(record["size"], 3);
        assert!(record["commit_latency_us"].is_u64());
        assert!(record["fill_wait_us"].is_u64());
    }
    assert_eq!(records[0]["outcome"], "committed");
    assert_eq!(records[1]["outcome"], "rolled_back");
    assert_eq!(records[1]["failed"], 3);
    assert_eq!(records[2]["outcome"], "committed");
    assert_eq!(records[2]["succeeded"], 3);

    let stats = executor.stats();
    assert_eq!(stats.windows_committed, 2);
    assert_eq!(stats.windows_rolled_back, 1);
    assert_eq!(stats.requests_processed, 9);
    assert_eq!(stats.window_size_histogram.iter().sum::<u64>(), 3);
    assert_eq!(stats.window_size_p50, 4);
    assert_eq!(stats.commit_latency_histogram_us.iter().sum::<u64>(), 3);
}

#[test]
fn stats_start_empty() {
    let executor = BulkExecutor::new(SharedHandle::new(InMemoryHandle::new()));
    let stats = executor.stats();
    assert_eq!(stats.windows_committed, 0);
    assert_eq!(stats.peak_queue_depth, 0);
    assert_eq!(stats.window_size_p95, 0);
    assert_eq!(stats.window_size_histogram.len(), stats.window_size_buckets.len() + 1);
    assert_eq!(executor.depth(), 0);
}

/// Sink that panics on every call.
struct PanickingMetrics;

impl ExecutorMetrics for PanickingMetrics {
    fn record_window(&self, event: WindowEvent) {
        panic!("metrics sink failed for window of {}", event.size);
    }

    fn record_backpressure(&self, _event: BackpressureEvent) {
        panic!("metrics sink failed for backpressure");
    }
}

#[test]
fn panicking_metrics_sink_does_not_strand_accepted_work() {
    let handle = InMemoryHandle::new();
    let probe = handle.probe();
    let config = ExecutorConfig {
        commit_every: 1,
        flush_interval_ms: 30_000,
        ..ExecutorConfig::default()
    };
    let mut executor = BulkExecutor::with_config(SharedHandle::new(handle), config).unwrap();
    executor.set_metrics(Arc::new(PanickingMetrics)).unwrap();

    for seq in 0 .. 5 {
        executor.create(NewRecord::vertex("Item", properties([("seq", json!(seq))]))).unwrap();
    }
    assert!(executor.wait_completion(Some(std::time::Duration::from_secs(5))));
    executor.close().unwrap();

    let snapshot = executor.snapshot();
    assert_eq!(snapshot.success_count, 5);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(probe.count_type("Item"), 5);
    let stats = executor.stats();
    assert_eq!(stats.metrics_panics, 5);
    assert_eq!(stats.windows_committed, 5);
}

#[test]
fn commit_latency_excludes_waiting_for_the_handle_lock() {
    let shared = SharedHandle::new(InMemoryHandle::new());
    let buffer = SharedBuffer::default();
    let config = ExecutorConfig {
        commit_every: 1,
        flush_interval_ms: 30_000,
        ..ExecutorConfig::default()
    };
    let mut executor = BulkExecutor::with_config(shared.clone(), config).unwrap();
    executor.set_metrics(Arc::new(JsonLinesMetrics::new(buffer.clone()))).unwrap();

    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let holder = {
        let shared = shared.clone();
        std::thread::spawn(move || {
            shared
                .with(|_| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(300));
                })
                .unwrap();
        })
    };
    locked_rx.recv().unwrap();
    executor.create(NewRecord::vertex("Item", properties([("seq", json!(1))]))).unwrap();
    holder.join().unwrap();
    executor.close().unwrap();

    let records = buffer.records();
    assert_eq!(records.len(), 1);
    assert!(records[0]["commit_latency_us"].as_u64().unwrap() < 250_000);
}
