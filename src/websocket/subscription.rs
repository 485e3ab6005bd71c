//! Topic subscriptions and tunnel management.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::Result;
use crate::error::LobsyncError;
use crate::models::ControlRequest;

use super::handler::TopicHandler;
use super::next_request_id;
use super::session::Session;

impl Session {
    /// Queues a control request and, if it asks for a response, waits for
    /// the matching `ack` within the configured timeout.
    ///
    /// The waiter is registered before the request is queued so an early
    /// `ack` is never missed. The wait ends early if the session closes.
    async fn request(&self, request: ControlRequest) -> Result<()> {
        self.ensure_running()?;

        let id = request.id.clone();
        let pending = request.response.then(|| self.acks().register(&id));

        debug!(id = %id, tpe = request.tpe.as_str(), "Queueing control request");
        self.outbound()
            .send(request)
            .await
            .map_err(|_| LobsyncError::Closed)?;

        if let Some(pending) = pending {
            tokio::select! {
                () = self.cancel_token().cancelled() => return Err(LobsyncError::Closed),
                result = pending.wait(self.config().ack_timeout) => result?,
            }
            debug!(id = %id, "Control request acknowledged");
        }
        Ok(())
    }

    /// Subscribes to `topic` and routes its messages to `handler`.
    ///
    /// The handler is installed before the request goes out so no message
    /// published right after the subscription is lost. If the request
    /// fails, the handler it replaced is put back, or the topic is left
    /// without one when there was none.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::AckTimeout`] if `ack` is set and the server
    /// does not confirm in time, or [`LobsyncError::Closed`] if the session
    /// is not running.
    pub async fn subscribe<H>(
        &self,
        topic: &str,
        tunnel_id: Option<&str>,
        private: bool,
        ack: bool,
        handler: H,
    ) -> Result<()>
    where
        H: TopicHandler + 'static,
    {
        let previous = self.handlers().insert(topic, Arc::new(handler));

        let request = ControlRequest::subscribe(next_request_id(), topic, tunnel_id, private, ack);
        if let Err(err) = self.request(request).await {
            match previous {
                Some(previous) => {
                    warn!(topic, error = %err, "Subscribe failed, keeping previous handler");
                    self.handlers().insert(topic, previous);
                }
                None => self.handlers().remove(topic),
            }
            return Err(err);
        }

        info!(topic, private, "Subscribed");
        Ok(())
    }

    /// Unsubscribes from `topic` and drops its handler.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Session::subscribe`]. The handler is dropped
    /// either way.
    pub async fn unsubscribe(&self, topic: &str, private: bool, ack: bool) -> Result<()> {
        let request = ControlRequest::unsubscribe(next_request_id(), topic, private, ack);
        let result = self.request(request).await;
        self.handlers().remove(topic);

        if result.is_ok() {
            info!(topic, "Unsubscribed");
        }
        result
    }

    /// Opens a multiplexed tunnel on this connection.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Session::subscribe`].
    pub async fn open_tunnel(&self, tunnel_id: &str, ack: bool) -> Result<()> {
        self.request(ControlRequest::open_tunnel(next_request_id(), tunnel_id, ack))
            .await?;
        info!(tunnel_id, "Tunnel opened");
        Ok(())
    }

    /// Closes a tunnel opened with [`Session::open_tunnel`].
    ///
    /// # Errors
    ///
    /// Same conditions as [`Session::subscribe`].
    pub async fn close_tunnel(&self, tunnel_id: &str, ack: bool) -> Result<()> {
        self.request(ControlRequest::close_tunnel(next_request_id(), tunnel_id, ack))
            .await?;
        info!(tunnel_id, "Tunnel closed");
        Ok(())
    }
}
