//! Tempest extractor daemon
//!
//! This binary coordinates:
//! - The live push feed and the streamer that drains it
//! - Backfill and frontfill against the historical API
//! - Batched uploads with watermark bookkeeping

mod bootstrap;
mod supervisor;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use tempx_config::AppConfig;
use tempx_core::stop_channel;
use tempx_ingest::TempestCollector;
use tempx_obs::{HealthState, Telemetry};
use tempx_sinks::UploadQueue;

use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    tempx_obs::init("tempxd");
    info!("Starting Tempest extractor");

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(
        device = %config.device_name(),
        prefix = %config.destination.external_id_prefix,
        backfill_days = config.backfill.backfill_days,
        "Loaded configuration"
    );

    // Meters are created by the components below, so the provider goes first
    let telemetry = Telemetry::install().context("Failed to set up metrics")?;
    let health = HealthState::new(telemetry);

    let collector = TempestCollector::new(bootstrap::collector_config(&config))
        .context("Failed to create Tempest collector")?;
    let station = collector
        .get_station()
        .await
        .context("Failed to fetch station metadata")?;
    info!(
        station = %station.name,
        station_id = station.station_id,
        timezone = %station.timezone,
        "Connected to station"
    );
    if !station.has_device(&config.tempest.device_id) {
        warn!(device = %config.tempest.device_id, "Configured device is not listed on the station");
    }

    let states = bootstrap::open_state_store(&config)?;
    let writer = bootstrap::open_writer(&config)?;
    let queue = Arc::new(UploadQueue::new(writer).with_state_store(Arc::clone(&states)));

    let (stop, signal) = stop_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        stop.stop();
    });

    info!("Extractor running - press Ctrl+C to stop");
    Supervisor::new(config, Arc::new(collector), states, queue)
        .with_health(Arc::clone(&health))
        .run(signal)
        .await?;

    health.telemetry().shutdown();
    info!("Tempest extractor stopped");
    Ok(())
}
