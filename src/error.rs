//! Crate-level error types.
//!
//! [`LobsyncError`] unifies every error source (configuration, transport,
//! protocol, JSON, REST) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator for easy
//! propagation. Book-level failures live in [`BookError`] and convert into
//! [`LobsyncError::Book`].

use std::time::Duration;

pub use crate::book::BookError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LobsyncError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum LobsyncError {
    /// A configuration value was missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An HTTP request to the REST collaborator failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A book operation was rejected.
    #[error("book error: {0}")]
    Book(#[from] BookError),

    /// The REST API answered with a non-success envelope.
    #[error("api error: [code:{code}, message:{message}]")]
    Api { code: String, message: String },

    /// The server sent a frame that is not valid at this point of the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The server reported an error frame; always fatal to the session.
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    /// A control request or heartbeat was not acknowledged in time.
    #[error("waited ack for {id}, timeout after {timeout:?}")]
    AckTimeout { id: String, timeout: Duration },

    /// The inbound queue filled up because the listener fell behind.
    #[error("inbound queue full ({capacity} frames), consumer too slow")]
    SlowConsumer { capacity: usize },

    /// The session is closed and can no longer be used.
    #[error("session closed")]
    Closed,
}
