//! Watermark persistence
//!
//! Stores map a metric key to its `(low, high)` watermark. The reconcilers
//! only see the [`WatermarkStore`] trait; which backend is used is a
//! deployment choice.

pub mod json;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use json::*;
pub use memory::*;
#[cfg(feature = "sqlite")]
pub use sqlite::*;

pub use tempx_core::{Watermark, WatermarkStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("State database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StateResult<T> = Result<T, StateError>;
