pub mod server;
pub mod telemetry;

pub use server::*;
pub use telemetry::*;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum ObsError {
    #[error("Metrics exporter error: {0}")]
    Exporter(#[from] opentelemetry::metrics::MetricsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ObsResult<T> = Result<T, ObsError>;

/// Initialize logging.
/// - JSON logs
/// - RUST_LOG respected; default to "info,tempx=debug"
pub fn init(service_name: &str) {
    let default_filter = "info,tempx=debug";
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(service = %service_name, "Observability initialized");
}
