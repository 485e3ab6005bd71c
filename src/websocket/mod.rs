//! Async websocket session for the level-3 market data feed.
//!
//! This module is organized by concern:
//! - [`session`] - Handshake, the running duties and lifecycle
//! - [`subscription`] - Acknowledged control requests (topics and tunnels)
//! - [`handler`] - Inbound frame routing and topic handlers
//! - [`pending`] - Id-keyed registry of requests awaiting a response

mod handler;
mod pending;
mod session;
mod subscription;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use tungstenite::Message;

use crate::Result;

pub use handler::{HandlerFuture, JsonHandler, TopicHandler, json_handler};
pub use pending::{Pending, PendingRegistry};
pub use session::{Heartbeat, Session, SessionState};

/// Write half of a websocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a websocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Tracks the last request id issued so every call returns a strictly
/// increasing value even when the wall-clock hasn't advanced.
static LAST_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Establishes a websocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`LobsyncError`](crate::LobsyncError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Returns a fresh request id with nanosecond resolution.
///
/// Uses the wall-clock as the baseline but guarantees that successive calls
/// always return a larger value than the previous one, so ids never repeat
/// within a process.
pub(crate) fn next_request_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default();

    let mut prev = LAST_REQUEST_ID.load(Ordering::Relaxed);
    loop {
        let id = now.max(prev + 1);
        match LAST_REQUEST_ID.compare_exchange_weak(prev, id, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return id.to_string(),
            Err(actual) => prev = actual,
        }
    }
}
