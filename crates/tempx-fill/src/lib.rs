//! Reconcilers that move Tempest data into the upload queue
//!
//! The streamer drains the live buffers on a fixed cadence, the backfiller
//! walks history backwards one window at a time until it reaches the
//! configured horizon, and the frontfiller closes the gap between the last
//! uploaded point and now once at startup.

pub mod backfill;
pub mod frontfill;
pub mod keys;
pub mod pool;
pub mod streamer;
pub mod throttle;

pub use backfill::*;
pub use frontfill::*;
pub use keys::*;
pub use pool::*;
pub use streamer::*;
pub use throttle::*;

use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    #[error("Historical fetch failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("State store error: {0:#}")]
    State(anyhow::Error),

    #[error("Worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("Worker pool closed")]
    PoolClosed,
}

pub type FillResult<T> = Result<T, FillError>;

/// Which reconciler produced a batch of datapoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPath {
    Stream,
    Backfill,
    Frontfill,
}

impl FillPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillPath::Stream => "stream",
            FillPath::Backfill => "backfill",
            FillPath::Frontfill => "frontfill",
        }
    }
}

#[derive(Clone)]
pub(crate) struct FillMetrics {
    enqueued: Counter<u64>,
    backfill_ticks: Counter<u64>,
}

impl FillMetrics {
    pub(crate) fn new() -> Self {
        let meter = opentelemetry::global::meter("tempx-fill");
        Self {
            enqueued: meter
                .u64_counter("tempx_datapoints_enqueued_total")
                .with_description("Datapoints handed to the upload queue")
                .init(),
            backfill_ticks: meter
                .u64_counter("tempx_backfill_ticks_total")
                .with_description("Backfill iterations executed")
                .init(),
        }
    }

    pub(crate) fn enqueued(&self, path: FillPath, count: usize) {
        self.enqueued
            .add(count as u64, &[KeyValue::new("path", path.as_str())]);
    }

    pub(crate) fn backfill_tick(&self) {
        self.backfill_ticks.add(1, &[]);
    }
}
