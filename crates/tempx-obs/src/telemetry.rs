use crate::ObsResult;
use opentelemetry::metrics::{Meter, MeterProvider};
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};

/// Prometheus registry fed by an OpenTelemetry meter provider
pub struct Telemetry {
    registry: Registry,
    provider: SdkMeterProvider,
}

impl Telemetry {
    pub fn new() -> ObsResult<Self> {
        let registry = Registry::new();
        let reader = exporter().with_registry(registry.clone()).build()?;
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        Ok(Self { registry, provider })
    }

    /// Build and register as the global meter provider, so every
    /// `opentelemetry::global::meter` created afterwards reports here.
    pub fn install() -> ObsResult<Self> {
        let telemetry = Self::new()?;
        opentelemetry::global::set_meter_provider(telemetry.provider.clone());
        Ok(telemetry)
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.provider.meter(name)
    }

    /// Current metrics in the Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buf) {
            tracing::warn!(error=?e, "failed to encode metrics");
        }
        String::from_utf8(buf).unwrap_or_default()
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(error=?e, "failed to shut down meter provider");
        }
    }
}
