//! Startup gap closer between the newest uploaded point and now

use crate::{FillError, FillMetrics, FillPath, FillResult, MetricKeys, WorkPool};
use chrono::Utc;
use std::sync::Arc;
use tempx_core::{
    materialize, non_empty, HistoricalRange, HistoricalSource, TimestampMs, UploadSink,
    WatermarkStore,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontfillOutcome {
    /// No metric has a high watermark yet
    Skipped,
    Filled { from: TimestampMs, enqueued: usize },
}

#[derive(Clone)]
pub struct Frontfiller {
    source: Arc<dyn HistoricalSource>,
    sink: Arc<dyn UploadSink>,
    states: Arc<dyn WatermarkStore>,
    keys: MetricKeys,
    elements: Arc<Vec<String>>,
    parallelism: usize,
    metrics: FillMetrics,
}

impl Frontfiller {
    pub fn new(
        source: Arc<dyn HistoricalSource>,
        sink: Arc<dyn UploadSink>,
        states: Arc<dyn WatermarkStore>,
        keys: MetricKeys,
        elements: Vec<String>,
        parallelism: usize,
    ) -> Self {
        Self {
            source,
            sink,
            states,
            keys,
            elements: Arc::new(elements),
            parallelism,
            metrics: FillMetrics::new(),
        }
    }

    /// Fetch from the oldest high watermark up to `now` and enqueue it
    pub async fn extract(&self, now: TimestampMs) -> FillResult<FrontfillOutcome> {
        let mut highs = Vec::with_capacity(self.elements.len());
        for element in self.elements.iter() {
            let state = self
                .states
                .get(&self.keys.key(element))
                .map_err(FillError::State)?;
            if let Some(high) = state.high {
                highs.push(high);
            }
        }
        let Some(from) = highs.into_iter().min() else {
            info!(device = %self.keys.device_id(), "No uploaded data yet, skipping frontfill");
            return Ok(FrontfillOutcome::Skipped);
        };

        let observations = self
            .source
            .fetch_historical(HistoricalRange::Interval {
                start: from / 1000,
                end: now / 1000,
            })
            .await
            .map_err(FillError::Transport)?;

        let mut enqueued = 0;
        for (metric, points) in non_empty(materialize(&observations, &self.elements)) {
            enqueued += points.len();
            self.sink.enqueue(&self.keys.key(&metric), points);
        }
        self.metrics.enqueued(FillPath::Frontfill, enqueued);
        info!(
            device = %self.keys.device_id(),
            records = observations.len(),
            enqueued,
            "Frontfill enqueued"
        );
        Ok(FrontfillOutcome::Filled { from, enqueued })
    }

    /// Single pass on the worker pool
    pub async fn run(self) -> FillResult<FrontfillOutcome> {
        let pool = WorkPool::new("frontfill", self.parallelism);
        let this = self.clone();
        let outcome = pool
            .run(async move { this.extract(Utc::now().timestamp_millis()).await })
            .await??;
        info!("Frontfilling done");
        Ok(outcome)
    }
}
