use std::time::Duration;
use tempx_core::StopSignal;
use tokio::time::Instant;

/// Paces a loop so that iterations start at most once per `interval`.
///
/// The stop signal is checked before every iteration and also cuts the
/// wait between iterations short.
pub struct ThrottledLoop {
    interval: Duration,
    stop: StopSignal,
    last_start: Option<Instant>,
}

impl ThrottledLoop {
    pub fn new(interval: Duration, stop: StopSignal) -> Self {
        Self {
            interval,
            stop,
            last_start: None,
        }
    }

    /// Wait out the rest of the current interval. Returns false once the
    /// loop should end.
    pub async fn next_iteration(&mut self) -> bool {
        if self.stop.is_stopped() {
            return false;
        }
        if let Some(last) = self.last_start {
            let deadline = last + self.interval;
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = self.stop.stopped() => return false,
            }
        }
        self.last_start = Some(Instant::now());
        true
    }
}
