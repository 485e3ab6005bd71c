//! Registry of requests waiting for an `ack` or `pong`.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::Result;
use crate::error::LobsyncError;

/// Maps request ids to one-shot completion signals.
///
/// A waiter is registered before its request is sent and removed when the
/// wait finishes, whichever way it finishes. Resolving is idempotent: the
/// first resolution consumes the entry, so duplicate or late responses
/// find nothing and are ignored.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    waiters: DashMap<String, oneshot::Sender<()>>,
}

impl PendingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id`.
    pub fn register(&self, id: &str) -> Pending<'_> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id.to_string(), tx);
        Pending {
            registry: self,
            id: id.to_string(),
            rx,
        }
    }

    /// Wakes the waiter for `id`. Returns `false` if nobody was waiting.
    pub fn resolve(&self, id: &str) -> bool {
        match self.waiters.remove(id) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Drops every waiter; their waits fail with [`LobsyncError::Closed`].
    pub fn clear(&self) {
        self.waiters.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// A registered wait. Dropping it deregisters the id.
#[derive(Debug)]
pub struct Pending<'a> {
    registry: &'a PendingRegistry,
    id: String,
    rx: oneshot::Receiver<()>,
}

impl Pending<'_> {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits until the id is resolved or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::AckTimeout`] on timeout and
    /// [`LobsyncError::Closed`] if the registry was cleared meanwhile.
    pub async fn wait(mut self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LobsyncError::Closed),
            Err(_) => Err(LobsyncError::AckTimeout {
                id: self.id.clone(),
                timeout,
            }),
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.registry.waiters.remove(&self.id);
    }
}
