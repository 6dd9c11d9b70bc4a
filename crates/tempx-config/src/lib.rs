use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tempx_core::{ObservationField, Summary};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TempestConfig {
    pub token: String,
    pub device_id: String,
    pub device_name: Option<String>,
    /// Observation fields uploaded as series
    pub elements: Vec<String>,
    /// Summary fields uploaded as series
    pub summaries: Vec<String>,
    /// Subscribe to rapid wind events on the push feed
    pub rapid_wind: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub external_id_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Seconds between upload queue flushes
    pub upload_interval: u64,
    pub parallelism: usize,
    /// Seconds between live buffer drains
    pub collector_interval: u64,
    /// Build live keys as `{prefix}{device}_{metric}`
    pub legacy_stream_keys: bool,
    /// Seconds to wait before reopening a closed feed
    pub reconnect_delay: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            upload_interval: 10,
            parallelism: 10,
            collector_interval: 2,
            legacy_stream_keys: false,
            reconnect_delay: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub backfill_days: u32,
    /// Seconds between backfill ticks
    pub iteration_time: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            backfill_days: 5,
            iteration_time: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStoreConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub backend: StateBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    /// Directory for the JSONL writer
    pub fs_dir: PathBuf,
    pub influx: Option<InfluxConfig>,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            fs_dir: PathBuf::from("data"),
            influx: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tempest: TempestConfig,
    pub destination: DestinationConfig,
    pub extractor: ExtractorConfig,
    pub backfill: BackfillConfig,
    pub state_store: Option<StateStoreConfig>,
    pub sinks: SinksConfig,
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl FromStr for AppConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl AppConfig {
    /// Load configuration from the TEMPX_CONFIG path (TOML), falling back to
    /// defaults when the file is missing. TEMPEST_TOKEN replaces the file
    /// token.
    pub fn load() -> ConfigResult<Self> {
        let path = std::env::var("TEMPX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let cfg = Self::from_path(&path)?.with_token_override(std::env::var("TEMPEST_TOKEN").ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        fs::read_to_string(path)?.parse()
    }

    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.tempest.token = token;
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.tempest.token.is_empty() {
            return Err(invalid("tempest.token must be set"));
        }
        if self.tempest.device_id.is_empty() {
            return Err(invalid("tempest.device_id must be set"));
        }
        if self.extractor.parallelism == 0 {
            return Err(invalid("extractor.parallelism must be at least 1"));
        }
        for (name, secs) in [
            ("extractor.upload_interval", self.extractor.upload_interval),
            ("extractor.collector_interval", self.extractor.collector_interval),
            ("backfill.iteration_time", self.backfill.iteration_time),
        ] {
            if secs == 0 {
                return Err(invalid(&format!("{} must be at least 1 second", name)));
            }
        }
        if let Some(element) = self
            .tempest
            .elements
            .iter()
            .find(|e| ObservationField::from_str(e).is_err())
        {
            return Err(invalid(&format!("unknown element '{}'", element)));
        }
        if let Some(summary) = self
            .tempest
            .summaries
            .iter()
            .find(|s| Summary::is_string(s).is_none())
        {
            return Err(invalid(&format!("unknown summary field '{}'", summary)));
        }
        Ok(())
    }

    /// Name used in log lines, the device id unless configured
    pub fn device_name(&self) -> &str {
        self.tempest
            .device_name
            .as_deref()
            .unwrap_or(&self.tempest.device_id)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.extractor.upload_interval)
    }

    pub fn collector_interval(&self) -> Duration {
        Duration::from_secs(self.extractor.collector_interval)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.extractor.reconnect_delay)
    }

    pub fn iteration_time(&self) -> Duration {
        Duration::from_secs(self.backfill.iteration_time)
    }

    /// Metrics endpoint bind address, if enabled (default 0.0.0.0:9090)
    pub fn metrics_bind(&self) -> Option<String> {
        self.metrics.as_ref().map(|m| {
            m.bind
                .clone()
                .unwrap_or_else(|| "0.0.0.0:9090".to_string())
        })
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
