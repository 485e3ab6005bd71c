//! REST bootstrap: connection tokens and full-depth snapshots.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::Result;
use crate::book::L3Snapshot;
use crate::config::ExchangeConfig;
use crate::models::token::{ApiResponse, Token};
use crate::sync::SnapshotSource;

const TOKEN_PATH: &str = "/api/v1/bullet-public";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client over the public REST endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    snapshot_path: String,
}

impl RestClient {
    /// # Errors
    ///
    /// Returns [`LobsyncError::Http`](crate::LobsyncError::Http) if the
    /// HTTP client can't be built.
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            snapshot_path: config.snapshot_path.clone(),
        })
    }

    /// Requests a public connection token and the servers it is valid for.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx statuses, or a non-success
    /// response envelope.
    pub async fn public_token(&self) -> Result<Token> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);
        debug!(url = %url, "Requesting public token");

        let response: ApiResponse<Token> = self
            .http
            .post(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_data()
    }

    /// Fetches the full-depth L3 snapshot for `symbol`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`RestClient::public_token`].
    pub async fn fetch_snapshot(&self, symbol: &str) -> Result<L3Snapshot> {
        let url = format!("{}{}", self.base_url, self.snapshot_path);
        debug!(url = %url, symbol, "Requesting snapshot");

        let response: ApiResponse<L3Snapshot> = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_data()
    }
}

impl SnapshotSource for RestClient {
    fn fetch_snapshot(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<L3Snapshot>> + Send {
        RestClient::fetch_snapshot(self, symbol)
    }
}
