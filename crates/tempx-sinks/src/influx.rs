use crate::SeriesWriter;
use anyhow::{anyhow, Result};
use reqwest::Client;
use tempx_core::{Datapoint, DatapointValue};

/// Writes series to InfluxDB 2.x as `tempest,key=<key> value=<v> <ms>`
pub struct InfluxSink {
    client: Client,
    base_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl InfluxSink {
    pub fn new(base_url: String, org: String, bucket: String, token: String) -> Result<Self> {
        if base_url.is_empty() || org.is_empty() || bucket.is_empty() || token.is_empty() {
            return Err(anyhow!("invalid influx configuration"));
        }
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            org,
            bucket,
            token,
        })
    }

    fn to_line_protocol(key: &str, datapoints: &[Datapoint]) -> String {
        let tag = key
            .replace('\\', "\\\\")
            .replace(',', "\\,")
            .replace('=', "\\=")
            .replace(' ', "\\ ");
        datapoints
            .iter()
            .map(|point| {
                let field = match &point.value {
                    DatapointValue::Numeric(v) => format!("value={}", v),
                    DatapointValue::Text(s) => {
                        format!("text=\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                    }
                };
                format!("tempest,key={} {} {}", tag, field, point.timestamp_ms)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl SeriesWriter for InfluxSink {
    async fn write(&mut self, key: &str, datapoints: &[Datapoint]) -> Result<()> {
        if datapoints.is_empty() {
            return Ok(());
        }
        let body = Self::to_line_protocol(key, datapoints);
        let url = format!("{}/api/v2/write", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("influx write failed: {} {}", status, text));
        }
        Ok(())
    }
}
