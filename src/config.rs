//! Application configuration loaded from environment variables.
//!
//! Every value is optional and falls back to a default:
//! - `LOBSYNC_REST_URL` - REST base URL for the token and snapshot endpoints
//! - `LOBSYNC_SYMBOL` - instrument whose book is reconstructed
//! - `LOBSYNC_SNAPSHOT_PATH` - path of the full-depth snapshot endpoint
//! - `LOBSYNC_DEPTH` - price levels per side shown in book reports
//! - `LOBSYNC_ACK_TIMEOUT_MS` - wait for an `ack` or `pong`
//! - `LOBSYNC_HANDSHAKE_TIMEOUT_MS` - wait for connect plus `welcome`
//! - `LOBSYNC_QUEUE_CAPACITY` - size of the inbound and outbound queues

use std::str::FromStr;
use std::time::Duration;

use crate::error::LobsyncError;

/// Default public REST endpoint.
const DEFAULT_REST_URL: &str = "https://api.kucoin.com";
const DEFAULT_SYMBOL: &str = "BTC-USDT";
const DEFAULT_SNAPSHOT_PATH: &str = "/api/v1/market/orderbook/level3";
const DEFAULT_DEPTH: usize = 10;
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub session: SessionConfig,
}

/// Where the book comes from.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub rest_url: String,
    pub symbol: String,
    pub snapshot_path: String,
    pub depth: usize,
}

impl ExchangeConfig {
    /// Websocket topic carrying level-3 diffs for the configured symbol.
    #[must_use]
    pub fn level3_topic(&self) -> String {
        format!("/market/level3:{}", self.symbol)
    }
}

/// Timing and queue sizing for a websocket session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ack_timeout: Duration,
    pub handshake_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`LobsyncError::Config`] if a numeric variable does not parse
/// or the queue capacity is zero.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let exchange = ExchangeConfig {
        rest_url: non_empty_var("LOBSYNC_REST_URL")
            .unwrap_or_else(|| DEFAULT_REST_URL.to_string())
            .trim_end_matches('/')
            .to_string(),
        symbol: non_empty_var("LOBSYNC_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
        snapshot_path: non_empty_var("LOBSYNC_SNAPSHOT_PATH")
            .unwrap_or_else(|| DEFAULT_SNAPSHOT_PATH.to_string()),
        depth: parse_var("LOBSYNC_DEPTH", DEFAULT_DEPTH)?,
    };

    let session = SessionConfig {
        ack_timeout: millis_var("LOBSYNC_ACK_TIMEOUT_MS", DEFAULT_ACK_TIMEOUT)?,
        handshake_timeout: millis_var("LOBSYNC_HANDSHAKE_TIMEOUT_MS", DEFAULT_HANDSHAKE_TIMEOUT)?,
        queue_capacity: parse_var("LOBSYNC_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
    };

    if session.queue_capacity == 0 {
        return Err(LobsyncError::Config(
            "LOBSYNC_QUEUE_CAPACITY must be at least 1".to_string(),
        ));
    }

    Ok(AppConfig { exchange, session })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> crate::Result<T> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LobsyncError::Config(format!("{name} is not a valid number: {raw:?}"))),
        None => Ok(default),
    }
}

fn millis_var(name: &str, default: Duration) -> crate::Result<Duration> {
    match non_empty_var(name) {
        Some(_) => parse_var::<u64>(name, 0).map(Duration::from_millis),
        None => Ok(default),
    }
}
