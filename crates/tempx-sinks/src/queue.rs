//! Batched upload queue with watermark bookkeeping

use crate::SeriesWriter;
use opentelemetry::metrics::Counter;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tempx_core::{Checkpoint, Datapoint, StopSignal, UploadSink, WatermarkStore};
use tracing::{debug, info, warn};

/// Points retained for one key before a stuck destination is reported
pub const DEFAULT_BACKLOG_WARNING: usize = 50_000;

struct QueueMetrics {
    uploaded: Counter<u64>,
    failures: Counter<u64>,
}

impl QueueMetrics {
    fn new() -> Self {
        let meter = opentelemetry::global::meter("tempx-sinks");
        Self {
            uploaded: meter
                .u64_counter("tempx_datapoints_uploaded_total")
                .with_description("Datapoints written to the destination")
                .init(),
            failures: meter
                .u64_counter("tempx_upload_failures_total")
                .with_description("Series writes that failed and were re-queued")
                .init(),
        }
    }
}

/// Checkpoint waiting for the keys of its group to be written
struct PendingCheckpoint {
    checkpoint: Checkpoint,
    unwritten: HashSet<String>,
}

#[derive(Default)]
struct Pending {
    series: HashMap<String, Vec<Datapoint>>,
    checkpoints: Vec<PendingCheckpoint>,
}

/// Collects series from every loop and writes them out in batches.
///
/// After a key is written, its watermark is widened to cover the written
/// timestamps. A failed write puts the series back for the next flush.
/// Group checkpoints are stored in enqueue order once their keys are written.
pub struct UploadQueue {
    pending: Mutex<Pending>,
    writer: tokio::sync::Mutex<Box<dyn SeriesWriter>>,
    states: Option<Arc<dyn WatermarkStore>>,
    backlog_warning: usize,
    metrics: QueueMetrics,
}

impl UploadQueue {
    pub fn new(writer: Box<dyn SeriesWriter>) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            writer: tokio::sync::Mutex::new(writer),
            states: None,
            backlog_warning: DEFAULT_BACKLOG_WARNING,
            metrics: QueueMetrics::new(),
        }
    }

    /// Track uploaded ranges and group checkpoints in `states`
    pub fn with_state_store(mut self, states: Arc<dyn WatermarkStore>) -> Self {
        self.states = Some(states);
        self
    }

    /// Warn once a key's retained backlog reaches `points`
    pub fn with_backlog_warning(mut self, points: usize) -> Self {
        self.backlog_warning = points.max(1);
        self
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Datapoints waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.pending().series.values().map(Vec::len).sum()
    }

    /// Group checkpoints not yet stored
    pub fn pending_checkpoints(&self) -> usize {
        self.pending().checkpoints.len()
    }

    /// Write everything queued so far. Returns the number of datapoints
    /// written.
    pub async fn flush(&self) -> usize {
        // The writer lock spans take, write and settle
        let mut writer = self.writer.lock().await;
        let (batch, checkpoints) = {
            let mut pending = self.pending();
            (
                std::mem::take(&mut pending.series),
                std::mem::take(&mut pending.checkpoints),
            )
        };
        if batch.is_empty() && checkpoints.is_empty() {
            return 0;
        }

        let mut uploaded = 0;
        let mut written = HashSet::new();
        for (key, points) in batch {
            match writer.write(&key, &points).await {
                Ok(()) => {
                    uploaded += points.len();
                    self.record_upload(&key, &points);
                    written.insert(key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Upload failed, keeping series for next flush");
                    self.metrics.failures.add(1, &[]);
                    self.requeue(key, points);
                }
            }
        }
        self.settle(checkpoints, &written);

        self.metrics.uploaded.add(uploaded as u64, &[]);
        debug!(uploaded, "Upload queue flushed");
        uploaded
    }

    /// Store the leading checkpoints whose groups are fully written; the
    /// rest wait for a later flush.
    fn settle(&self, checkpoints: Vec<PendingCheckpoint>, written: &HashSet<String>) {
        let mut waiting = Vec::new();
        for mut pending in checkpoints {
            pending.unwritten.retain(|key| !written.contains(key));
            if waiting.is_empty() && pending.unwritten.is_empty() {
                self.commit(&pending.checkpoint);
            } else {
                waiting.push(pending);
            }
        }
        if waiting.is_empty() {
            return;
        }
        let mut pending = self.pending();
        waiting.append(&mut pending.checkpoints);
        pending.checkpoints = waiting;
    }

    fn commit(&self, checkpoint: &Checkpoint) {
        let Some(states) = &self.states else {
            return;
        };
        match states.set(&checkpoint.key, checkpoint.watermark) {
            Ok(()) => debug!(key = %checkpoint.key, "Checkpoint stored"),
            Err(e) => warn!(key = %checkpoint.key, error = %e, "Failed to store checkpoint"),
        }
    }

    fn record_upload(&self, key: &str, points: &[Datapoint]) {
        let Some(states) = &self.states else {
            return;
        };
        let low = points.iter().map(|p| p.timestamp_ms).min();
        let high = points.iter().map(|p| p.timestamp_ms).max();
        if let (Some(low), Some(high)) = (low, high) {
            if let Err(e) = states.expand(key, low, high) {
                warn!(key = %key, error = %e, "Failed to record watermark");
            }
        }
    }

    /// Put a failed series back in front of anything queued since. Returns
    /// true when this pushed the key's backlog past the warning threshold.
    fn requeue(&self, key: String, points: Vec<Datapoint>) -> bool {
        let mut pending = self.pending();
        let queued = pending.series.entry(key).or_default();
        let before = queued.len();
        queued.splice(0..0, points);
        let crossed = before < self.backlog_warning && queued.len() >= self.backlog_warning;
        if crossed {
            warn!(
                retained = queued.len(),
                threshold = self.backlog_warning,
                "Upload backlog keeps growing while the destination fails"
            );
        }
        crossed
    }

    /// Flush every `interval` until `stop` fires, then flush once more
    pub async fn run(self: Arc<Self>, interval: Duration, mut stop: StopSignal) {
        info!(interval_secs = interval.as_secs(), "Upload queue started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.flush().await;
                }
                _ = stop.stopped() => break,
            }
        }
        let remaining = self.flush().await;
        info!(remaining, "Upload queue stopped");
    }
}

impl UploadSink for UploadQueue {
    fn enqueue(&self, key: &str, datapoints: Vec<Datapoint>) {
        if datapoints.is_empty() {
            return;
        }
        self.pending()
            .series
            .entry(key.to_string())
            .or_default()
            .extend(datapoints);
    }

    fn enqueue_group(&self, series: Vec<(String, Vec<Datapoint>)>, checkpoint: Checkpoint) {
        if self.states.is_none() {
            warn!(key = %checkpoint.key, "No state store attached, checkpoint dropped");
        }
        let mut pending = self.pending();
        let mut unwritten = HashSet::new();
        for (key, points) in series {
            if points.is_empty() {
                continue;
            }
            pending.series.entry(key.clone()).or_default().extend(points);
            unwritten.insert(key);
        }
        if self.states.is_some() {
            pending.checkpoints.push(PendingCheckpoint {
                checkpoint,
                unwritten,
            });
        }
    }
}
