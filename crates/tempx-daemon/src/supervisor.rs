//! Spawns every extractor loop and waits for them to wind down

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tempx_config::AppConfig;
use tempx_core::{StopSignal, WatermarkStore};
use tempx_fill::{
    BackfillConfig, Backfiller, Frontfiller, MetricKeys, Streamer, StreamerConfig,
};
use tempx_ingest::{supervise_feed, TempestCollector};
use tempx_obs::HealthState;
use tempx_sinks::UploadQueue;
use tokio::task::JoinSet;
use tracing::{error, info};

type TaskResult = (&'static str, Result<()>);

/// Owns the long-lived collaborators and runs them until stopped
pub struct Supervisor {
    config: AppConfig,
    collector: Arc<TempestCollector>,
    states: Arc<dyn WatermarkStore>,
    queue: Arc<UploadQueue>,
    health: Option<Arc<HealthState>>,
}

impl Supervisor {
    pub fn new(
        config: AppConfig,
        collector: Arc<TempestCollector>,
        states: Arc<dyn WatermarkStore>,
        queue: Arc<UploadQueue>,
    ) -> Self {
        Self {
            config,
            collector,
            states,
            queue,
            health: None,
        }
    }

    /// Serve health and metrics while running
    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    fn keys(&self) -> MetricKeys {
        MetricKeys::new(
            &self.config.destination.external_id_prefix,
            &self.config.tempest.device_id,
        )
    }

    fn spawn_feed(&self, tasks: &mut JoinSet<TaskResult>, stop: StopSignal) {
        let collector = Arc::clone(&self.collector);
        let delay = self.config.reconnect_delay();
        tasks.spawn(async move {
            supervise_feed(&collector, stop, delay).await;
            ("feed", Ok(()))
        });
    }

    fn spawn_queue(&self, tasks: &mut JoinSet<TaskResult>, stop: StopSignal) {
        let queue = Arc::clone(&self.queue);
        let interval = self.config.upload_interval();
        tasks.spawn(async move {
            queue.run(interval, stop).await;
            ("upload queue", Ok(()))
        });
    }

    fn spawn_streamer(&self, tasks: &mut JoinSet<TaskResult>, stop: StopSignal) {
        let streamer = Streamer::new(
            self.collector.clone(),
            self.queue.clone(),
            self.keys()
                .with_legacy_separator(self.config.extractor.legacy_stream_keys),
            StreamerConfig {
                elements: self.config.tempest.elements.clone(),
                summaries: self.config.tempest.summaries.clone(),
                interval: self.config.collector_interval(),
                parallelism: self.config.extractor.parallelism,
            },
        );
        tasks.spawn(async move { ("streamer", streamer.run(stop).await.map_err(Into::into)) });
    }

    fn spawn_backfill(&self, tasks: &mut JoinSet<TaskResult>, stop: StopSignal) {
        let backfiller = Backfiller::new(
            self.collector.clone(),
            self.queue.clone(),
            Arc::clone(&self.states),
            self.keys(),
            BackfillConfig {
                elements: self.config.tempest.elements.clone(),
                backfill_days: self.config.backfill.backfill_days,
                iteration_time: self.config.iteration_time(),
                parallelism: self.config.extractor.parallelism,
            },
        );
        tasks.spawn(async move {
            let result = backfiller.run(stop).await.map(|_| ());
            ("backfiller", result.map_err(Into::into))
        });
    }

    fn spawn_frontfill(&self, tasks: &mut JoinSet<TaskResult>) {
        let frontfiller = Frontfiller::new(
            self.collector.clone(),
            self.queue.clone(),
            Arc::clone(&self.states),
            self.keys(),
            self.config.tempest.elements.clone(),
            self.config.extractor.parallelism,
        );
        tasks.spawn(async move {
            let result = frontfiller.run().await.map(|_| ());
            ("frontfiller", result.map_err(Into::into))
        });
    }

    fn spawn_metrics(
        &self,
        tasks: &mut JoinSet<TaskResult>,
        mut stop: StopSignal,
    ) -> Result<()> {
        let (Some(bind), Some(health)) = (self.config.metrics_bind(), self.health.clone()) else {
            return Ok(());
        };
        let addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("Invalid metrics bind address {}", bind))?;
        tasks.spawn(async move {
            let result = tempx_obs::serve(addr, health, async move { stop.stopped().await }).await;
            ("metrics server", result.map_err(Into::into))
        });
        Ok(())
    }

    /// Run until `stop` fires and every loop has returned, then flush the
    /// upload queue one last time.
    pub async fn run(self, stop: StopSignal) -> Result<()> {
        info!(
            device = %self.config.device_name(),
            elements = self.config.tempest.elements.len(),
            summaries = self.config.tempest.summaries.len(),
            "Supervisor starting"
        );

        let mut tasks = JoinSet::new();
        self.spawn_metrics(&mut tasks, stop.clone())?;
        self.spawn_queue(&mut tasks, stop.clone());
        self.spawn_feed(&mut tasks, stop.clone());
        self.spawn_streamer(&mut tasks, stop.clone());
        self.spawn_backfill(&mut tasks, stop.clone());
        self.spawn_frontfill(&mut tasks);

        if let Some(health) = &self.health {
            health.set_ready(true);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(task = name, "Task finished"),
                Ok((name, Err(e))) => error!(task = name, error = %e, "Task failed"),
                Err(e) => error!(error = %e, "Task panicked"),
            }
        }

        if let Some(health) = &self.health {
            health.set_ready(false);
        }
        let remaining = self.queue.flush().await;
        info!(remaining, "Supervisor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempx_core::stop_channel;
    use tempx_ingest::CollectorConfig;
    use tempx_sinks::FsSink;
    use tempx_state::MemoryStateStore;

    const OBS_AIR: &str =
        r#"{"type": "obs_air", "device_id": 1110, "obs": [[1700000000, 1001.5, 11.0, 80, 0, 0, 2.6, 1]]}"#;

    async fn unreachable_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("127.0.0.1:{}", addr.port())
    }

    #[tokio::test]
    async fn buffered_records_are_uploaded_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config: AppConfig = r#"
[tempest]
token = "t"
device_id = "1110"
elements = ["pressure", "air_temperature"]

[destination]
external_id_prefix = "tempest:"

[extractor]
reconnect_delay = 60
"#
        .parse()
        .unwrap();

        let host = unreachable_url().await;
        let mut collector_config = CollectorConfig::new("t", "1110");
        collector_config.feed_url = format!("ws://{}/swd/data", host);
        collector_config.rest_url = format!("http://{}/swd/rest", host);
        let collector = Arc::new(TempestCollector::new(collector_config).unwrap());
        collector.ingest_message(OBS_AIR);

        let states = Arc::new(MemoryStateStore::new());
        let writer = FsSink::new(dir.path()).unwrap();
        let queue =
            Arc::new(UploadQueue::new(Box::new(writer)).with_state_store(states.clone()));

        let (handle, signal) = stop_channel();
        let supervisor = Supervisor::new(config, collector, states.clone(), queue);
        let task = tokio::spawn(supervisor.run(signal));

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("datapoints.jsonl")).unwrap();
        assert!(written.contains(r#""key":"tempest:1110:pressure""#));
        assert!(written.contains(r#""key":"tempest:1110:air_temperature""#));

        let pressure = states.get("tempest:1110:pressure").unwrap();
        assert_eq!(pressure.high, Some(1_700_000_000_000));
    }
}
