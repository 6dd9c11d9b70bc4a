//! Streaming collector: live buffers plus one-shot REST access

use crate::buffer::RecordBuffer;
use crate::client::{RestClient, DEFAULT_REST_URL};
use crate::feed::DEFAULT_FEED_URL;
use crate::IngestResult;
use chrono::Utc;
use opentelemetry::metrics::Counter;
use serde_json::json;
use tempx_core::{
    decode_envelope, decode_summary, Envelope, HistoricalRange, HistoricalSource, LiveSource,
    Observation, Station, Summary,
};
use tracing::{debug, info, warn};

/// Connection settings for one device
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub token: String,
    pub device_id: String,
    pub rest_url: String,
    pub feed_url: String,
    /// Also subscribe to rapid wind events on the push feed
    pub rapid_wind: bool,
}

impl CollectorConfig {
    pub fn new(token: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            device_id: device_id.into(),
            rest_url: DEFAULT_REST_URL.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            rapid_wind: false,
        }
    }
}

/// Records accepted from a single feed message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub observations: usize,
    pub summaries: usize,
    pub dropped: usize,
}

struct CollectorMetrics {
    observations: Counter<u64>,
    summaries: Counter<u64>,
    decode_failures: Counter<u64>,
}

impl CollectorMetrics {
    fn new() -> Self {
        let meter = opentelemetry::global::meter("tempx-ingest");
        Self {
            observations: meter
                .u64_counter("tempx_observations_received_total")
                .with_description("Observations decoded from the push feed")
                .init(),
            summaries: meter
                .u64_counter("tempx_summaries_received_total")
                .with_description("Summaries decoded from the push feed")
                .init(),
            decode_failures: meter
                .u64_counter("tempx_decode_failures_total")
                .with_description("Records or summaries dropped during decoding")
                .init(),
        }
    }
}

/// Collector for one Tempest device
pub struct TempestCollector {
    config: CollectorConfig,
    client: RestClient,
    observations: RecordBuffer<Observation>,
    summaries: RecordBuffer<Summary>,
    metrics: CollectorMetrics,
}

impl TempestCollector {
    pub fn new(config: CollectorConfig) -> IngestResult<Self> {
        let client = RestClient::new(&config.rest_url, &config.token)?;
        Ok(Self {
            config,
            client,
            observations: RecordBuffer::new(),
            summaries: RecordBuffer::new(),
            metrics: CollectorMetrics::new(),
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Handshake messages sent when the feed opens
    pub fn handshake(&self, session_id: u32) -> Vec<String> {
        let mut messages = vec![json!({
            "type": "listen_start",
            "device_id": self.config.device_id,
            "id": session_id.to_string(),
        })
        .to_string()];
        if self.config.rapid_wind {
            messages.push(
                json!({
                    "type": "listen_rapid_start",
                    "device_id": self.config.device_id,
                    "id": session_id.to_string(),
                })
                .to_string(),
            );
        }
        messages
    }

    /// Decode one feed message into the live buffers.
    ///
    /// Undecodable records are logged and dropped; the rest of the message is
    /// still accepted.
    pub fn ingest_message(&self, text: &str) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable feed message");
                outcome.dropped += 1;
                self.metrics.decode_failures.add(1, &[]);
                return outcome;
            }
        };

        if envelope.summary.is_some() {
            match decode_summary(&envelope) {
                Ok(summary) if summary.is_valid() => {
                    self.summaries.append(summary);
                    outcome.summaries += 1;
                }
                Ok(_) => {
                    warn!("Dropping summary without an epoch");
                    outcome.dropped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Dropping summary");
                    outcome.dropped += 1;
                }
            }
        }

        let mut decoded = Vec::new();
        for result in decode_envelope(&envelope) {
            match result {
                Ok(observation) => decoded.push(observation),
                Err(e) => {
                    warn!(error = %e, "Dropping feed record");
                    outcome.dropped += 1;
                }
            }
        }
        outcome.observations = decoded.len();
        self.observations.extend(decoded);

        if outcome.observations == 0 && outcome.summaries == 0 && outcome.dropped == 0 {
            debug!(kind = ?envelope.kind, "Feed message carried no records");
        }

        self.metrics
            .observations
            .add(outcome.observations as u64, &[]);
        self.metrics.summaries.add(outcome.summaries as u64, &[]);
        self.metrics.decode_failures.add(outcome.dropped as u64, &[]);
        outcome
    }

    /// Retrieve buffered observations and reset the buffer
    pub fn drain_observations(&self) -> Vec<Observation> {
        self.observations.drain()
    }

    /// Retrieve buffered summaries and reset the buffer
    pub fn drain_summaries(&self) -> Vec<Summary> {
        self.summaries.drain()
    }

    /// Observations stored by the API for the configured device
    pub async fn get_historical(&self, range: HistoricalRange) -> IngestResult<Vec<Observation>> {
        let (start, end) = range.resolve(Utc::now());
        let envelope = self
            .client
            .get_observations(&self.config.device_id, start, end)
            .await?;

        let mut observations = Vec::new();
        for result in decode_envelope(&envelope) {
            match result {
                Ok(observation) => observations.push(observation),
                Err(e) => {
                    warn!(error = %e, "Dropping historical record");
                    self.metrics.decode_failures.add(1, &[]);
                }
            }
        }
        info!(
            device = %self.config.device_id,
            start,
            end,
            count = observations.len(),
            "Fetched historical observations"
        );
        Ok(observations)
    }

    pub async fn get_station(&self) -> IngestResult<Station> {
        self.client.get_station().await
    }
}

#[async_trait::async_trait]
impl HistoricalSource for TempestCollector {
    async fn fetch_historical(&self, range: HistoricalRange) -> anyhow::Result<Vec<Observation>> {
        Ok(self.get_historical(range).await?)
    }
}

impl LiveSource for TempestCollector {
    fn drain_observations(&self) -> Vec<Observation> {
        TempestCollector::drain_observations(self)
    }

    fn drain_summaries(&self) -> Vec<Summary> {
        TempestCollector::drain_summaries(self)
    }
}
