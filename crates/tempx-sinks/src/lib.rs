use anyhow::Result;
#[cfg(feature = "influx")]
pub mod influx;
pub mod queue;

pub use queue::*;

use serde::Serialize;
use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempx_core::{Datapoint, DatapointValue};

/// Final destination of a flushed series
#[async_trait::async_trait]
pub trait SeriesWriter: Send + Sync {
    async fn write(&mut self, key: &str, datapoints: &[Datapoint]) -> Result<()>;
}

#[derive(Serialize)]
struct DatapointLine<'a> {
    key: &'a str,
    timestamp_ms: i64,
    value: &'a DatapointValue,
}

/// Appends one JSON line per datapoint to `datapoints.jsonl`
pub struct FsSink {
    file: PathBuf,
}

impl FsSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        let file = dir.join("datapoints.jsonl");
        Ok(Self { file })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

#[async_trait::async_trait]
impl SeriesWriter for FsSink {
    async fn write(&mut self, key: &str, datapoints: &[Datapoint]) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file)?;
        for point in datapoints {
            let line = serde_json::to_string(&DatapointLine {
                key,
                timestamp_ms: point.timestamp_ms,
                value: &point.value,
            })?;
            f.write_all(line.as_bytes())?;
            f.write_all(b"\n")?;
        }
        Ok(())
    }
}
