//! Push feed session over WebSocket

use crate::{IngestError, IngestResult, TempestCollector};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tempx_core::StopSignal;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_FEED_URL: &str = "wss://ws.weatherflow.com/swd/data";

/// Why a feed session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedExit {
    /// The stop signal fired
    Stopped,
    /// The server closed the connection or the stream ended
    Closed,
}

/// Random 9-digit id identifying one listening session
pub fn session_id() -> u32 {
    rand::thread_rng().gen_range(100_000_000..=999_999_999)
}

fn feed_url(base: &str, token: &str) -> IngestResult<Url> {
    Ok(Url::parse_with_params(base, &[("token", token)])?)
}

/// Run one feed connection until it closes or `stop` fires.
///
/// Every text frame is handed to [`TempestCollector::ingest_message`].
/// Reconnecting is left to the caller.
pub async fn run_feed(collector: &TempestCollector, stop: &mut StopSignal) -> IngestResult<FeedExit> {
    let config = collector.config();
    let url = feed_url(&config.feed_url, &config.token)?;

    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let session = session_id();
    for message in collector.handshake(session) {
        write.send(Message::Text(message)).await?;
    }
    info!(device = %config.device_id, session, "Listening to push feed");

    loop {
        tokio::select! {
            _ = stop.stopped() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(FeedExit::Stopped);
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let outcome = collector.ingest_message(&text);
                    debug!(?outcome, "Feed message ingested");
                }
                Some(Ok(Message::Ping(payload))) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Push feed closed by server");
                    return Ok(FeedExit::Closed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Push feed error");
                    return Err(IngestError::WebSocket(e));
                }
                None => return Ok(FeedExit::Closed),
            }
        }
    }
}

/// Keep the push feed open until `stop` fires, reopening it
/// `reconnect_delay` after every close or failure.
pub async fn supervise_feed(
    collector: &TempestCollector,
    mut stop: StopSignal,
    reconnect_delay: Duration,
) {
    let delay_secs = reconnect_delay.as_secs_f64();
    loop {
        match run_feed(collector, &mut stop).await {
            Ok(FeedExit::Stopped) => break,
            Ok(FeedExit::Closed) => info!(delay_secs, "Push feed closed, reconnecting"),
            Err(e) => warn!(error = %e, delay_secs, "Push feed failed, reconnecting"),
        }
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = stop.stopped() => break,
        }
    }
    info!("Push feed stopped");
}
