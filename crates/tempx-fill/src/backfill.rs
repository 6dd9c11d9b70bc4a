//! Backward walk through history, one fixed window per tick

use crate::{FillError, FillMetrics, FillPath, FillResult, MetricKeys, ThrottledLoop, WorkPool};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempx_core::{
    materialize, non_empty, Checkpoint, HistoricalRange, HistoricalSource, StopSignal,
    TimestampMs, UploadSink, Watermark, WatermarkStore,
};
use tracing::{debug, info, instrument, warn};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Width of one backfill window
pub const BACKFILL_WINDOW_MS: i64 = 7 * DAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillState {
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// The window did not move past the previous one. Either the horizon was
    /// already covered or history has a gap wider than a window.
    NoProgress,
    /// The next window would cross the horizon
    HorizonReached { clamped_from: TimestampMs },
}

/// Decision for a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStep {
    Fetch { from: TimestampMs, to: TimestampMs },
    Done(DoneReason),
}

/// Choose the next window.
///
/// `lows` are the low watermarks known for the configured metrics and
/// `last_from` is the lower edge of the previously fetched window. Both fall
/// back to `now` when absent.
pub fn plan(
    now: TimestampMs,
    horizon: TimestampMs,
    lows: &[TimestampMs],
    last_from: Option<TimestampMs>,
) -> BackfillStep {
    let to = lows.iter().copied().max().unwrap_or(now);
    let from = to - BACKFILL_WINDOW_MS;
    let last_from = last_from.unwrap_or(now);

    if from >= last_from {
        BackfillStep::Done(DoneReason::NoProgress)
    } else if from < horizon {
        BackfillStep::Done(DoneReason::HorizonReached {
            clamped_from: horizon,
        })
    } else {
        BackfillStep::Fetch { from, to }
    }
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub elements: Vec<String>,
    pub backfill_days: u32,
    pub iteration_time: Duration,
    pub parallelism: usize,
}

/// Walks backwards from the oldest uploaded point until the horizon
#[derive(Clone)]
pub struct Backfiller {
    source: Arc<dyn HistoricalSource>,
    sink: Arc<dyn UploadSink>,
    states: Arc<dyn WatermarkStore>,
    keys: MetricKeys,
    config: Arc<BackfillConfig>,
    horizon: TimestampMs,
    metrics: FillMetrics,
}

impl Backfiller {
    /// The horizon is fixed here, `backfill_days` before the current time
    pub fn new(
        source: Arc<dyn HistoricalSource>,
        sink: Arc<dyn UploadSink>,
        states: Arc<dyn WatermarkStore>,
        keys: MetricKeys,
        config: BackfillConfig,
    ) -> Self {
        let horizon = Utc::now().timestamp_millis() - i64::from(config.backfill_days) * DAY_MS;
        Self {
            source,
            sink,
            states,
            keys,
            config: Arc::new(config),
            horizon,
            metrics: FillMetrics::new(),
        }
    }

    /// Replace the horizon computed at construction
    pub fn with_horizon(mut self, horizon: TimestampMs) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn horizon(&self) -> TimestampMs {
        self.horizon
    }

    fn read_state(&self, key: &str) -> FillResult<Watermark> {
        self.states.get(key).map_err(FillError::State)
    }

    /// Next step given what the state store currently holds
    pub fn next_step(&self, now: TimestampMs) -> FillResult<BackfillStep> {
        let mut lows = Vec::with_capacity(self.config.elements.len());
        for element in &self.config.elements {
            if let Some(low) = self.read_state(&self.keys.key(element))?.low {
                lows.push(low);
            }
        }
        let last_from = self.read_state(&self.keys.backfill_last_from())?.low;
        Ok(plan(now, self.horizon, &lows, last_from))
    }

    /// Run one iteration: plan, then fetch and enqueue a window.
    ///
    /// `last_from` travels with the window as a checkpoint and is stored by
    /// the sink once the window's series are written. Until then the next
    /// tick plans the same window again.
    #[instrument(skip(self), fields(device = %self.keys.device_id()))]
    pub async fn tick(&self, now: TimestampMs) -> FillResult<BackfillState> {
        self.metrics.backfill_tick();

        let (from, to) = match self.next_step(now)? {
            BackfillStep::Fetch { from, to } => (from, to),
            BackfillStep::Done(DoneReason::NoProgress) => {
                info!("Backfill window did not move, nothing older to fetch");
                return Ok(BackfillState::Done);
            }
            BackfillStep::Done(DoneReason::HorizonReached { clamped_from }) => {
                info!(horizon = %format_ms(clamped_from), "Backfilling reached configured limit");
                return Ok(BackfillState::Done);
            }
        };

        info!(from = %format_ms(from), to = %format_ms(to), "Backfilling window");
        let observations = self
            .source
            .fetch_historical(HistoricalRange::Interval {
                start: from / 1000,
                end: to / 1000,
            })
            .await
            .map_err(FillError::Transport)?;

        let series: Vec<_> = non_empty(materialize(&observations, &self.config.elements))
            .map(|(metric, points)| (self.keys.key(&metric), points))
            .collect();
        let enqueued = series.iter().map(|(_, points)| points.len()).sum();
        self.sink.enqueue_group(
            series,
            Checkpoint::new(
                self.keys.backfill_last_from(),
                Watermark::new(Some(from), None),
            ),
        );
        self.metrics.enqueued(FillPath::Backfill, enqueued);
        debug!(records = observations.len(), enqueued, "Backfill window enqueued");
        Ok(BackfillState::Running)
    }

    /// Tick every `iteration_time` until done or stopped.
    ///
    /// Failed ticks are logged and retried on the next iteration.
    pub async fn run(self, stop: StopSignal) -> FillResult<BackfillState> {
        let pool = WorkPool::new("backfill", self.config.parallelism);
        let mut throttle = ThrottledLoop::new(self.config.iteration_time, stop);
        info!(
            device = %self.keys.device_id(),
            horizon = %format_ms(self.horizon),
            "Backfiller started"
        );

        while throttle.next_iteration().await {
            let this = self.clone();
            let outcome = pool
                .run(async move { this.tick(Utc::now().timestamp_millis()).await })
                .await?;
            match outcome {
                Ok(BackfillState::Done) => {
                    info!("Backfilling done");
                    return Ok(BackfillState::Done);
                }
                Ok(BackfillState::Running) => {}
                Err(e) => warn!(error = %e, "Backfill tick failed"),
            }
        }

        info!("Backfiller stopped before reaching its limit");
        Ok(BackfillState::Running)
    }
}

fn format_ms(ms: TimestampMs) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(t) => t.to_rfc3339(),
        None => ms.to_string(),
    }
}
