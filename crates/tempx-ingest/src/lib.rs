//! Tempest device ingestion
//!
//! This crate owns everything that talks to the device's cloud: the push
//! feed session, the REST client for station metadata and history, and the
//! collector that buffers decoded records until the streamer drains them.

pub mod buffer;
pub mod client;
pub mod collector;
pub mod feed;

pub use buffer::*;
pub use client::*;
pub use collector::*;
pub use feed::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No stations visible to this token")]
    NoStations,
}

pub type IngestResult<T> = Result<T, IngestError>;
