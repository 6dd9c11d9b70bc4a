/// Builds destination keys for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricKeys {
    prefix: String,
    device_id: String,
    legacy_separator: bool,
}

impl MetricKeys {
    pub fn new(prefix: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            device_id: device_id.into(),
            legacy_separator: false,
        }
    }

    /// Join device and metric with `_` instead of `:`. Older deployments
    /// stored their live series under these keys.
    pub fn with_legacy_separator(mut self, legacy: bool) -> Self {
        self.legacy_separator = legacy;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// `{prefix}{device_id}:{metric}`
    pub fn key(&self, metric: &str) -> String {
        let separator = if self.legacy_separator { '_' } else { ':' };
        format!("{}{}{}{}", self.prefix, self.device_id, separator, metric)
    }

    /// Where the backfiller keeps the lower edge of its last window
    pub fn backfill_last_from(&self) -> String {
        format!("{}{}:backfill_last_from", self.prefix, self.device_id)
    }
}
