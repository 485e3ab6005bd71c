//! Connection token and instance-server models returned by the REST
//! bootstrap endpoints.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::Result;
use crate::error::LobsyncError;
use crate::websocket::Heartbeat;

/// Success code carried in the REST response envelope.
pub const API_SUCCESS: &str = "200000";

/// Shortest heartbeat interval derived from server settings.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(500);

/// REST response envelope: `{code, msg, data}`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwraps the payload of a successful response.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::Api`] if the code is not the success code
    /// or the payload is missing.
    pub fn into_data(self) -> Result<T> {
        match self.data {
            Some(data) if self.code == API_SUCCESS => Ok(data),
            _ => Err(LobsyncError::Api {
                code: self.code,
                message: self.msg,
            }),
        }
    }
}

/// A websocket server the token may be used against.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceServer {
    pub endpoint: String,
    pub protocol: String,
    #[serde(default)]
    pub encrypt: bool,
    /// Milliseconds between client pings the server expects.
    pub ping_interval: u64,
    /// Milliseconds the server allows before a ping counts as lost.
    pub ping_timeout: u64,
}

impl InstanceServer {
    /// Heartbeat timing derived from the advertised settings: ping one
    /// second ahead of the server's interval, wait at most its timeout.
    #[must_use]
    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            interval: Duration::from_millis(self.ping_interval)
                .saturating_sub(Duration::from_secs(1))
                .max(MIN_PING_INTERVAL),
            timeout: Duration::from_millis(self.ping_timeout),
        }
    }
}

/// Connection token plus the servers it is valid for.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub token: String,
    pub instance_servers: Vec<InstanceServer>,
}

impl Token {
    /// Picks the first instance speaking the websocket protocol.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::Protocol`] if no instance supports websockets.
    pub fn instance(&self) -> Result<&InstanceServer> {
        self.instance_servers
            .iter()
            .find(|server| server.protocol == "websocket")
            .ok_or_else(|| LobsyncError::Protocol("no websocket instance server offered".into()))
    }

    /// Builds the connect URL for `instance`, carrying the token and a
    /// fresh `connectId`.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::Protocol`] if the instance endpoint is not a
    /// valid URL.
    pub fn connect_url(&self, instance: &InstanceServer) -> Result<String> {
        let mut url = reqwest::Url::parse(&instance.endpoint).map_err(|e| {
            LobsyncError::Protocol(format!("invalid endpoint {:?}: {e}", instance.endpoint))
        })?;
        let connect_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        url.query_pairs_mut()
            .append_pair("connectId", &connect_id.to_string())
            .append_pair("token", &self.token);

        Ok(url.into())
    }
}
