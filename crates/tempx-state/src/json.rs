//! JSON file backed watermark store

use crate::StateResult;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempx_core::{Watermark, WatermarkStore};
use tracing::{debug, info};

type StateMap = BTreeMap<String, (Option<i64>, Option<i64>)>;

/// Keeps every watermark in memory and rewrites the whole file on each
/// `set`. The file maps key -> `[low, high]`.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    states: Mutex<StateMap>,
}

impl JsonFileStateStore {
    /// Open a store, loading existing state if the file is present
    pub fn open<P: AsRef<Path>>(path: P) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        let states: StateMap = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StateMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            StateMap::new()
        };
        info!(path = %path.display(), keys = states.len(), "Loaded state store");

        Ok(Self {
            path,
            states: Mutex::new(states),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, states: &StateMap) -> StateResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(states)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "State store written");
        Ok(())
    }
}

impl WatermarkStore for JsonFileStateStore {
    fn get(&self, key: &str) -> anyhow::Result<Watermark> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(states
            .get(key)
            .map(|(low, high)| Watermark::new(*low, *high))
            .unwrap_or_default())
    }

    fn set(&self, key: &str, watermark: Watermark) -> anyhow::Result<()> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(key.to_string(), (watermark.low, watermark.high));
        self.write(&states)?;
        Ok(())
    }
}
