//! Builds the collaborators named in the configuration

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tempx_config::{AppConfig, StateBackend};
use tempx_core::WatermarkStore;
use tempx_ingest::CollectorConfig;
use tempx_sinks::{FsSink, SeriesWriter};
use tempx_state::{JsonFileStateStore, MemoryStateStore};
use tracing::info;

pub fn collector_config(config: &AppConfig) -> CollectorConfig {
    let mut collector = CollectorConfig::new(&config.tempest.token, &config.tempest.device_id);
    collector.rapid_wind = config.tempest.rapid_wind;
    collector
}

/// Watermark store from `[state_store]`, in memory when the section is absent
pub fn open_state_store(config: &AppConfig) -> Result<Arc<dyn WatermarkStore>> {
    let Some(store) = &config.state_store else {
        info!("No state store configured, progress is kept in memory");
        return Ok(Arc::new(MemoryStateStore::new()));
    };

    match store.backend {
        StateBackend::Json => {
            let states = JsonFileStateStore::open(&store.path).with_context(|| {
                format!("Failed to open state file {}", store.path.display())
            })?;
            info!(path = %store.path.display(), "Using JSON state store");
            Ok(Arc::new(states))
        }
        StateBackend::Sqlite => open_sqlite(&store.path),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &Path) -> Result<Arc<dyn WatermarkStore>> {
    let states = tempx_state::SqliteStateStore::open(path)
        .with_context(|| format!("Failed to open state database {}", path.display()))?;
    info!(path = %path.display(), "Using SQLite state store");
    Ok(Arc::new(states))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_path: &Path) -> Result<Arc<dyn WatermarkStore>> {
    anyhow::bail!("state_store.backend = \"sqlite\" needs tempxd built with the `sqlite` feature")
}

/// Series writer from `[sinks]`. InfluxDB wins over the file writer when
/// configured.
pub fn open_writer(config: &AppConfig) -> Result<Box<dyn SeriesWriter>> {
    if let Some(influx) = &config.sinks.influx {
        return open_influx(influx);
    }
    let sink = FsSink::new(&config.sinks.fs_dir).with_context(|| {
        format!("Failed to create sink directory {}", config.sinks.fs_dir.display())
    })?;
    info!(file = %sink.file().display(), "Writing datapoints to file");
    Ok(Box::new(sink))
}

#[cfg(feature = "influx")]
fn open_influx(influx: &tempx_config::InfluxConfig) -> Result<Box<dyn SeriesWriter>> {
    let sink = tempx_sinks::influx::InfluxSink::new(
        influx.url.clone(),
        influx.org.clone(),
        influx.bucket.clone(),
        influx.token.clone(),
    )
    .context("Failed to set up InfluxDB writer")?;
    info!(url = %influx.url, bucket = %influx.bucket, "Writing datapoints to InfluxDB");
    Ok(Box::new(sink))
}

#[cfg(not(feature = "influx"))]
fn open_influx(_influx: &tempx_config::InfluxConfig) -> Result<Box<dyn SeriesWriter>> {
    anyhow::bail!("[sinks.influx] needs tempxd built with the `influx` feature")
}
