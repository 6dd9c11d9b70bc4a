//! Live path: drain the collector buffers into the upload queue

use crate::{FillMetrics, FillPath, FillResult, MetricKeys, ThrottledLoop, WorkPool};
use std::sync::Arc;
use std::time::Duration;
use tempx_core::{materialize, non_empty, LiveSource, MetricRecord, StopSignal, UploadSink};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Observation fields uploaded as series
    pub elements: Vec<String>,
    /// Summary fields uploaded as series
    pub summaries: Vec<String>,
    pub interval: Duration,
    pub parallelism: usize,
}

/// Periodically moves everything buffered by the feed into the sink
#[derive(Clone)]
pub struct Streamer {
    source: Arc<dyn LiveSource>,
    sink: Arc<dyn UploadSink>,
    keys: MetricKeys,
    config: Arc<StreamerConfig>,
    metrics: FillMetrics,
}

impl Streamer {
    pub fn new(
        source: Arc<dyn LiveSource>,
        sink: Arc<dyn UploadSink>,
        keys: MetricKeys,
        config: StreamerConfig,
    ) -> Self {
        Self {
            source,
            sink,
            keys,
            config: Arc::new(config),
            metrics: FillMetrics::new(),
        }
    }

    /// Drain both buffers once. Returns the number of datapoints enqueued.
    pub fn extract(&self) -> usize {
        let observations = self.source.drain_observations();
        let summaries = self.source.drain_summaries();
        if observations.is_empty() && summaries.is_empty() {
            return 0;
        }

        let enqueued = self.enqueue(&observations, &self.config.elements)
            + self.enqueue(&summaries, &self.config.summaries);
        debug!(
            observations = observations.len(),
            summaries = summaries.len(),
            enqueued,
            "Streamed live records"
        );
        enqueued
    }

    fn enqueue<R: MetricRecord>(&self, records: &[R], metrics: &[String]) -> usize {
        let mut count = 0;
        for (metric, points) in non_empty(materialize(records, metrics)) {
            count += points.len();
            self.sink.enqueue(&self.keys.key(&metric), points);
        }
        self.metrics.enqueued(FillPath::Stream, count);
        count
    }

    /// Drain every `interval` until `stop` fires, then drain once more
    pub async fn run(self, stop: StopSignal) -> FillResult<()> {
        let pool = WorkPool::new("streamer", self.config.parallelism);
        let mut throttle = ThrottledLoop::new(self.config.interval, stop);
        info!(
            device = %self.keys.device_id(),
            interval_secs = self.config.interval.as_secs(),
            "Streamer started"
        );

        while throttle.next_iteration().await {
            let this = self.clone();
            pool.run(async move { this.extract() }).await?;
        }

        let remaining = self.extract();
        info!(remaining, "Streamer stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempx_core::{
        Checkpoint, Datapoint, DatapointValue, Observation, ObservationKind, Summary,
    };

    #[derive(Default)]
    struct Buffers {
        observations: Mutex<Vec<Observation>>,
        summaries: Mutex<Vec<Summary>>,
    }

    impl LiveSource for Buffers {
        fn drain_observations(&self) -> Vec<Observation> {
            std::mem::take(&mut *self.observations.lock().unwrap())
        }

        fn drain_summaries(&self) -> Vec<Summary> {
            std::mem::take(&mut *self.summaries.lock().unwrap())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Vec<Datapoint>)>>);

    impl UploadSink for Recorder {
        fn enqueue(&self, key: &str, datapoints: Vec<Datapoint>) {
            self.0.lock().unwrap().push((key.to_string(), datapoints));
        }

        fn enqueue_group(&self, series: Vec<(String, Vec<Datapoint>)>, _: Checkpoint) {
            self.0.lock().unwrap().extend(series);
        }
    }

    fn streamer(buffers: Arc<Buffers>, sink: Arc<Recorder>, legacy: bool) -> Streamer {
        Streamer::new(
            buffers,
            sink,
            MetricKeys::new("tempest:", "1110").with_legacy_separator(legacy),
            StreamerConfig {
                elements: vec!["air_temperature".into(), "lightning_strike_count".into()],
                summaries: vec!["pressure_trend".into()],
                interval: Duration::from_secs(2),
                parallelism: 1,
            },
        )
    }

    fn observation(epoch: i64, temperature: f64) -> Observation {
        let mut obs = Observation::empty(epoch, ObservationKind::Full);
        obs.air_temperature = Some(temperature);
        obs
    }

    #[test]
    fn test_extract_enqueues_non_empty_series() {
        let buffers = Arc::new(Buffers::default());
        let sink = Arc::new(Recorder::default());
        buffers
            .observations
            .lock()
            .unwrap()
            .extend([observation(100, 20.0), observation(160, 20.5)]);
        buffers.summaries.lock().unwrap().push(Summary {
            epoch: 100,
            pressure_trend: Some("falling".into()),
            ..Summary::default()
        });

        let streamer = streamer(Arc::clone(&buffers), Arc::clone(&sink), false);
        assert_eq!(streamer.extract(), 3);

        let written = sink.0.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, "tempest:1110:air_temperature");
        assert_eq!(
            written[0].1,
            vec![Datapoint::new(100_000, 20.0), Datapoint::new(160_000, 20.5)]
        );
        assert_eq!(written[1].0, "tempest:1110:pressure_trend");
        assert_eq!(
            written[1].1[0].value,
            DatapointValue::Text("falling".into())
        );
    }

    #[test]
    fn test_extract_with_nothing_buffered() {
        let sink = Arc::new(Recorder::default());
        let streamer = streamer(Arc::new(Buffers::default()), Arc::clone(&sink), false);
        assert_eq!(streamer.extract(), 0);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_legacy_keys() {
        let buffers = Arc::new(Buffers::default());
        let sink = Arc::new(Recorder::default());
        buffers.observations.lock().unwrap().push(observation(1, 3.0));

        streamer(buffers, Arc::clone(&sink), true).extract();
        assert_eq!(sink.0.lock().unwrap()[0].0, "tempest:1110_air_temperature");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_until_stopped() {
        let buffers = Arc::new(Buffers::default());
        let sink = Arc::new(Recorder::default());
        let (handle, signal) = tempx_core::stop_channel();
        let task = tokio::spawn(streamer(Arc::clone(&buffers), Arc::clone(&sink), false).run(signal));

        buffers.observations.lock().unwrap().push(observation(1, 1.0));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        buffers.observations.lock().unwrap().push(observation(2, 2.0));
        handle.stop();
        task.await.unwrap().unwrap();
        assert_eq!(sink.0.lock().unwrap().len(), 2);
        assert!(buffers.observations.lock().unwrap().is_empty());
    }
}
