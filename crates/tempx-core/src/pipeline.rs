use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::{Datapoint, Observation, Summary, Timestamp, Watermark};

/// Watermark write that only becomes durable once a group of series has
/// reached the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub key: String,
    pub watermark: Watermark,
}

impl Checkpoint {
    pub fn new(key: impl Into<String>, watermark: Watermark) -> Self {
        Self {
            key: key.into(),
            watermark,
        }
    }
}

/// Destination for materialized series. Implementations batch and flush on
/// their own schedule; `enqueue` must be cheap and callable from any task.
pub trait UploadSink: Send + Sync {
    fn enqueue(&self, key: &str, datapoints: Vec<Datapoint>);

    /// Enqueue `series` as one group. `checkpoint` is stored only after every
    /// series of the group has been written, and after every group enqueued
    /// before it. An empty group commits on the next flush.
    fn enqueue_group(&self, series: Vec<(String, Vec<Datapoint>)>, checkpoint: Checkpoint);
}

/// Point-wise repository of per-key watermarks
pub trait WatermarkStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Watermark>;

    fn set(&self, key: &str, watermark: Watermark) -> Result<()>;

    /// Widen the stored watermark to cover `[low, high]`
    fn expand(&self, key: &str, low: i64, high: i64) -> Result<Watermark> {
        let widened = self.get(key)?.expanded(low, high);
        self.set(key, widened)?;
        Ok(widened)
    }
}

/// Live records buffered from the push feed. Each drain hands over what has
/// arrived since the previous drain.
pub trait LiveSource: Send + Sync {
    fn drain_observations(&self) -> Vec<Observation>;

    fn drain_summaries(&self) -> Vec<Summary>;
}

/// Time span accepted by the historical API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricalRange {
    /// Closed interval of epoch seconds
    Interval { start: Timestamp, end: Timestamp },
    /// The last `n` days up to "now"
    LastDays(u32),
}

impl HistoricalRange {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        HistoricalRange::Interval {
            start: from.timestamp(),
            end: to.timestamp(),
        }
    }

    /// Resolve to `(start, end)` epoch seconds
    pub fn resolve(&self, now: DateTime<Utc>) -> (Timestamp, Timestamp) {
        match *self {
            HistoricalRange::Interval { start, end } => (start, end),
            HistoricalRange::LastDays(days) => (
                (now - Duration::days(i64::from(days))).timestamp(),
                now.timestamp(),
            ),
        }
    }
}

/// One-shot access to stored observations
#[async_trait::async_trait]
pub trait HistoricalSource: Send + Sync {
    async fn fetch_historical(&self, range: HistoricalRange) -> Result<Vec<Observation>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_last_days() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let (start, end) = HistoricalRange::LastDays(2).resolve(now);
        assert_eq!(end, 1_700_000_000);
        assert_eq!(start, 1_700_000_000 - 2 * 86_400);
    }

    #[test]
    fn test_resolve_interval_is_unchanged() {
        let now = Utc::now();
        let range = HistoricalRange::Interval { start: 10, end: 20 };
        assert_eq!(range.resolve(now), (10, 20));
    }
}
