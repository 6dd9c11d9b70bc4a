use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempx_core::{
    stop_channel, Checkpoint, Datapoint, HistoricalRange, HistoricalSource, Observation,
    ObservationKind, UploadSink, Watermark, WatermarkStore,
};
use tempx_fill::{
    BackfillConfig, BackfillState, Backfiller, FillError, FrontfillOutcome, Frontfiller,
    MetricKeys,
};
use tempx_sinks::{SeriesWriter, UploadQueue};
use tempx_state::MemoryStateStore;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR: i64 = 3600;
const NOW: i64 = 1_700_000_000_000;

/// Returns one observation an hour after the start of every requested range
#[derive(Default)]
struct FakeHistory {
    requests: Mutex<Vec<(i64, i64)>>,
    empty: bool,
    fail: Mutex<bool>,
}

#[async_trait::async_trait]
impl HistoricalSource for FakeHistory {
    async fn fetch_historical(&self, range: HistoricalRange) -> anyhow::Result<Vec<Observation>> {
        let HistoricalRange::Interval { start, end } = range else {
            anyhow::bail!("unexpected range {:?}", range);
        };
        if *self.fail.lock().unwrap() {
            anyhow::bail!("503 Service Unavailable");
        }
        self.requests.lock().unwrap().push((start, end));
        if self.empty {
            return Ok(Vec::new());
        }
        let mut obs = Observation::empty(start + HOUR, ObservationKind::Full);
        obs.air_temperature = Some(12.5);
        obs.pressure = Some(1001.0);
        Ok(vec![obs])
    }
}

/// Records enqueued series and applies watermarks and checkpoints as if
/// every write succeeded at once
struct WatermarkingSink {
    states: Arc<MemoryStateStore>,
    written: Mutex<Vec<(String, Vec<Datapoint>)>>,
}

impl WatermarkingSink {
    fn new(states: Arc<MemoryStateStore>) -> Self {
        Self {
            states,
            written: Mutex::new(Vec::new()),
        }
    }

    fn keys(&self) -> Vec<String> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl UploadSink for WatermarkingSink {
    fn enqueue(&self, key: &str, datapoints: Vec<Datapoint>) {
        let low = datapoints.iter().map(|p| p.timestamp_ms).min().unwrap();
        let high = datapoints.iter().map(|p| p.timestamp_ms).max().unwrap();
        self.states.expand(key, low, high).unwrap();
        self.written
            .lock()
            .unwrap()
            .push((key.to_string(), datapoints));
    }

    fn enqueue_group(&self, series: Vec<(String, Vec<Datapoint>)>, checkpoint: Checkpoint) {
        for (key, points) in series {
            self.enqueue(&key, points);
        }
        self.states
            .set(&checkpoint.key, checkpoint.watermark)
            .unwrap();
    }
}

/// Destination that rejects writes while `down` is set
#[derive(Default)]
struct Destination {
    down: AtomicBool,
    keys: Mutex<Vec<String>>,
}

struct DestinationWriter(Arc<Destination>);

#[async_trait::async_trait]
impl SeriesWriter for DestinationWriter {
    async fn write(&mut self, key: &str, _datapoints: &[Datapoint]) -> anyhow::Result<()> {
        if self.0.down.load(Ordering::SeqCst) {
            anyhow::bail!("destination unavailable");
        }
        self.0.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

fn upload_queue(
    destination: &Arc<Destination>,
    states: &Arc<MemoryStateStore>,
) -> Arc<UploadQueue> {
    Arc::new(
        UploadQueue::new(Box::new(DestinationWriter(destination.clone())))
            .with_state_store(states.clone()),
    )
}

fn queued_backfiller(
    history: &Arc<FakeHistory>,
    queue: &Arc<UploadQueue>,
    states: &Arc<MemoryStateStore>,
) -> Backfiller {
    Backfiller::new(
        history.clone(),
        queue.clone(),
        states.clone(),
        keys(),
        backfill_config(30),
    )
    .with_horizon(NOW - 30 * DAY_MS)
}

fn keys() -> MetricKeys {
    MetricKeys::new("tempest:", "1110")
}

fn backfill_config(days: u32) -> BackfillConfig {
    BackfillConfig {
        elements: vec!["air_temperature".into(), "pressure".into()],
        backfill_days: days,
        iteration_time: Duration::from_secs(30),
        parallelism: 2,
    }
}

fn backfiller(
    history: &Arc<FakeHistory>,
    sink: &Arc<WatermarkingSink>,
    states: &Arc<MemoryStateStore>,
    days: u32,
) -> Backfiller {
    Backfiller::new(
        history.clone(),
        sink.clone(),
        states.clone(),
        keys(),
        backfill_config(days),
    )
    .with_horizon(NOW - i64::from(days) * DAY_MS)
}

#[tokio::test]
async fn backfill_walks_back_to_horizon() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    let backfiller = backfiller(&history, &sink, &states, 30);

    let mut ticks = 0;
    while backfiller.tick(NOW).await.unwrap() == BackfillState::Running {
        ticks += 1;
        assert!(ticks < 10, "backfill did not terminate");
    }

    let requests = history.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0], ((NOW - 7 * DAY_MS) / 1000, NOW / 1000));
    for pair in requests.windows(2) {
        assert!(pair[1].0 < pair[0].0, "windows must move backwards");
    }
    for (start, _) in &requests {
        assert!(start * 1000 >= NOW - 30 * DAY_MS);
    }

    let keys = sink.keys();
    assert!(keys.contains(&"tempest:1110:air_temperature".to_string()));
    assert!(keys.contains(&"tempest:1110:pressure".to_string()));

    let last_from = states.get("tempest:1110:backfill_last_from").unwrap();
    assert_eq!(last_from.low, Some(requests[3].0 * 1000));
}

#[tokio::test]
async fn backfill_stops_when_history_has_a_gap() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory {
        empty: true,
        ..FakeHistory::default()
    });
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    let backfiller = backfiller(&history, &sink, &states, 30);

    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Running);
    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Done);

    assert_eq!(history.requests.lock().unwrap().len(), 1);
    assert!(sink.keys().is_empty());
}

#[tokio::test]
async fn backfill_done_without_upload_when_window_exceeds_horizon() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    states
        .set(
            "tempest:1110:air_temperature",
            Watermark::new(Some(NOW - DAY_MS), Some(NOW)),
        )
        .unwrap();

    let backfiller = backfiller(&history, &sink, &states, 5);
    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Done);

    assert!(history.requests.lock().unwrap().is_empty());
    assert!(sink.keys().is_empty());
    assert!(states
        .get("tempest:1110:backfill_last_from")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn backfill_resumes_from_persisted_state() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));

    let first = backfiller(&history, &sink, &states, 30);
    first.tick(NOW).await.unwrap();
    first.tick(NOW).await.unwrap();
    drop(first);

    let restarted = backfiller(&history, &sink, &states, 30);
    restarted.tick(NOW).await.unwrap();

    let requests = history.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);
    // Continues below the second window instead of starting from now again
    assert!(requests[2].1 < requests[1].1);
    assert_eq!(requests[2].1, requests[1].0 + HOUR);
}

#[tokio::test]
async fn failed_fetch_does_not_record_progress() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    let backfiller = backfiller(&history, &sink, &states, 30);

    *history.fail.lock().unwrap() = true;
    let err = backfiller.tick(NOW).await.unwrap_err();
    assert!(matches!(err, FillError::Transport(_)));
    assert!(states
        .get("tempest:1110:backfill_last_from")
        .unwrap()
        .is_empty());

    *history.fail.lock().unwrap() = false;
    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Running);
    assert_eq!(history.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn backfill_retries_window_until_it_is_uploaded() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let destination = Arc::new(Destination::default());
    let queue = upload_queue(&destination, &states);
    let backfiller = queued_backfiller(&history, &queue, &states);
    let first_window = ((NOW - 7 * DAY_MS) / 1000, NOW / 1000);

    destination.down.store(true, Ordering::SeqCst);
    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Running);
    assert_eq!(queue.flush().await, 0);
    assert!(states
        .get("tempest:1110:backfill_last_from")
        .unwrap()
        .is_empty());

    // Nothing was uploaded, so the same window is planned again
    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Running);
    assert_eq!(
        history.requests.lock().unwrap().clone(),
        vec![first_window, first_window]
    );

    destination.down.store(false, Ordering::SeqCst);
    assert_eq!(queue.flush().await, 4);
    assert_eq!(
        states.get("tempest:1110:backfill_last_from").unwrap().low,
        Some(NOW - 7 * DAY_MS)
    );
    assert_eq!(
        states.get("tempest:1110:pressure").unwrap().low,
        Some(NOW - 7 * DAY_MS + HOUR * 1000)
    );

    assert_eq!(backfiller.tick(NOW).await.unwrap(), BackfillState::Running);
    let requests = history.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[2],
        ((NOW - 14 * DAY_MS) / 1000 + HOUR, (NOW - 7 * DAY_MS) / 1000 + HOUR)
    );
}

#[tokio::test]
async fn window_lost_before_upload_is_fetched_after_restart() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let destination = Arc::new(Destination::default());

    let queue = upload_queue(&destination, &states);
    let first = queued_backfiller(&history, &queue, &states);
    assert_eq!(first.tick(NOW).await.unwrap(), BackfillState::Running);
    drop(first);
    drop(queue);

    let queue = upload_queue(&destination, &states);
    let restarted = queued_backfiller(&history, &queue, &states);
    assert_eq!(restarted.tick(NOW).await.unwrap(), BackfillState::Running);
    queue.flush().await;

    let requests = history.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
    assert_eq!(destination.keys.lock().unwrap().len(), 2);
    assert_eq!(
        states.get("tempest:1110:backfill_last_from").unwrap().low,
        Some(NOW - 7 * DAY_MS)
    );
}

#[tokio::test(start_paused = true)]
async fn backfill_run_finishes_when_done() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory {
        empty: true,
        ..FakeHistory::default()
    });
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    let backfiller = Backfiller::new(
        history.clone(),
        sink.clone(),
        states.clone(),
        keys(),
        backfill_config(30),
    );

    let (_handle, signal) = stop_channel();
    let state = backfiller.run(signal).await.unwrap();
    assert_eq!(state, BackfillState::Done);
    assert_eq!(history.requests.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn backfill_run_honours_stop() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    let backfiller = Backfiller::new(
        history.clone(),
        sink.clone(),
        states.clone(),
        keys(),
        backfill_config(3650),
    );

    let (handle, signal) = stop_channel();
    let task = tokio::spawn(backfiller.run(signal));
    tokio::time::sleep(Duration::from_secs(45)).await;
    handle.stop();

    let state = task.await.unwrap().unwrap();
    assert_eq!(state, BackfillState::Running);
    assert_eq!(history.requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn frontfill_skips_without_watermarks() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    let frontfiller = Frontfiller::new(
        history.clone(),
        sink.clone(),
        states.clone(),
        keys(),
        vec!["air_temperature".into()],
        1,
    );

    assert_eq!(frontfiller.run().await.unwrap(), FrontfillOutcome::Skipped);
    assert!(history.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn frontfill_starts_at_oldest_high_watermark() {
    let states = Arc::new(MemoryStateStore::new());
    let history = Arc::new(FakeHistory::default());
    let sink = Arc::new(WatermarkingSink::new(states.clone()));
    states
        .set(
            "tempest:1110:air_temperature",
            Watermark::new(Some(NOW - 9 * DAY_MS), Some(NOW - 2 * DAY_MS)),
        )
        .unwrap();
    states
        .set(
            "tempest:1110:pressure",
            Watermark::new(Some(NOW - 9 * DAY_MS), Some(NOW - DAY_MS)),
        )
        .unwrap();

    let frontfiller = Frontfiller::new(
        history.clone(),
        sink.clone(),
        states.clone(),
        keys(),
        vec!["air_temperature".into(), "pressure".into()],
        1,
    );
    let outcome = frontfiller.extract(NOW).await.unwrap();

    assert_eq!(
        outcome,
        FrontfillOutcome::Filled {
            from: NOW - 2 * DAY_MS,
            enqueued: 2
        }
    );
    assert_eq!(
        history.requests.lock().unwrap()[0],
        ((NOW - 2 * DAY_MS) / 1000, NOW / 1000)
    );
}
