use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tempx_core::{Watermark, WatermarkStore};

/// Watermarks held only for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, Watermark>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key currently tracked
    pub fn keys(&self) -> Vec<String> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.keys().cloned().collect()
    }
}

impl WatermarkStore for MemoryStateStore {
    fn get(&self, key: &str) -> anyhow::Result<Watermark> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(states.get(key).copied().unwrap_or_default())
    }

    fn set(&self, key: &str, watermark: Watermark) -> anyhow::Result<()> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(key.to_string(), watermark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_empty() {
        let store = MemoryStateStore::new();
        assert!(store.get("tempest:1110:pressure").unwrap().is_empty());
    }

    #[test]
    fn test_expand_widens() {
        let store = MemoryStateStore::new();
        store.expand("k", 5_000, 6_000).unwrap();
        store.expand("k", 7_000, 9_000).unwrap();

        assert_eq!(
            store.get("k").unwrap(),
            Watermark::new(Some(5_000), Some(9_000))
        );
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}
