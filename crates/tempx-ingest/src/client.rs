//! Tempest REST API client (station metadata and historical observations)

use crate::{IngestError, IngestResult};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tempx_core::{Envelope, Station, Timestamp};
use tracing::{debug, instrument};

pub const DEFAULT_REST_URL: &str = "https://swd.weatherflow.com/swd/rest";

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<Station>,
}

/// Thin wrapper over the REST endpoints the extractor needs
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> IngestResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// First station visible to the token
    #[instrument(skip(self))]
    pub async fn get_station(&self) -> IngestResult<Station> {
        let url = format!("{}/stations", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await?;
        let body: StationsResponse = check_status(resp).await?.json().await?;
        body.stations
            .into_iter()
            .next()
            .ok_or(IngestError::NoStations)
    }

    /// Observations for a device within `[start, end]` epoch seconds
    #[instrument(skip(self))]
    pub async fn get_observations(
        &self,
        device_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> IngestResult<Envelope> {
        let url = format!("{}/observations/device/{}", self.base_url, device_id);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("token", self.token.clone()),
                ("time_start", start.to_string()),
                ("time_end", end.to_string()),
            ])
            .send()
            .await?;
        let envelope: Envelope = check_status(resp).await?.json().await?;
        debug!(
            records = envelope.obs.as_ref().map_or(0, Vec::len),
            "Historical response received"
        );
        Ok(envelope)
    }
}

async fn check_status(resp: Response) -> IngestResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(IngestError::Status {
        status: status.as_u16(),
        body,
    })
}
