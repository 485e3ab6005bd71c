//! Inbound frame routing and per-topic handlers.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::Result;
use crate::error::LobsyncError;
use crate::models::{InboundFrame, TopicMessage};

use super::pending::PendingRegistry;

/// Boxed future returned by [`TopicHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Consumes messages published on one topic.
///
/// Handlers run on the task that calls [`Session::listen`](super::Session::listen),
/// one message at a time, in arrival order. An error ends the listen loop.
pub trait TopicHandler: Send + Sync {
    fn handle<'a>(&'a self, message: &'a TopicMessage) -> HandlerFuture<'a>;
}

impl<H: TopicHandler + ?Sized> TopicHandler for Arc<H> {
    fn handle<'a>(&'a self, message: &'a TopicMessage) -> HandlerFuture<'a> {
        (**self).handle(message)
    }
}

/// Adapts a closure over a typed payload into a [`TopicHandler`].
pub struct JsonHandler<T, F> {
    f: F,
    _payload: PhantomData<fn(T)>,
}

/// Wraps `f` so it receives each message's `data` decoded as `T`.
pub fn json_handler<T, F>(f: F) -> JsonHandler<T, F>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Result<()> + Send + Sync,
{
    JsonHandler {
        f,
        _payload: PhantomData,
    }
}

impl<T, F> TopicHandler for JsonHandler<T, F>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Result<()> + Send + Sync,
{
    fn handle<'a>(&'a self, message: &'a TopicMessage) -> HandlerFuture<'a> {
        Box::pin(async move {
            let payload = T::deserialize(&message.data)?;
            (self.f)(payload)
        })
    }
}

/// Topic name to handler table.
#[derive(Default)]
pub(super) struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn TopicHandler>>,
}

impl HandlerRegistry {
    /// Returns the handler previously registered for `topic`.
    pub(super) fn insert(
        &self,
        topic: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> Option<Arc<dyn TopicHandler>> {
        self.handlers.insert(topic.to_string(), handler)
    }

    pub(super) fn remove(&self, topic: &str) {
        self.handlers.remove(topic);
    }

    /// Clones the handler out so no map guard is held while it runs.
    pub(super) fn get(&self, topic: &str) -> Option<Arc<dyn TopicHandler>> {
        self.handlers.get(topic).map(|entry| Arc::clone(entry.value()))
    }
}

/// Routes one classified frame from the reader duty.
///
/// Responses wake their waiters, topic payloads go to the bounded inbound
/// queue. Returns an error for every condition that must end the session.
pub(super) fn route(
    frame: InboundFrame,
    acks: &PendingRegistry,
    pongs: &PendingRegistry,
    inbound: &mpsc::Sender<TopicMessage>,
    capacity: usize,
) -> Result<()> {
    match frame {
        InboundFrame::Welcome { .. } => Err(LobsyncError::Protocol(
            "welcome received after handshake".into(),
        )),
        InboundFrame::Error { code, message, .. } => Err(LobsyncError::Server { code, message }),
        InboundFrame::Pong { id } => {
            if !pongs.resolve(&id) {
                debug!(id = %id, "Dropped unmatched pong");
            }
            Ok(())
        }
        InboundFrame::Ack { id } => {
            if !acks.resolve(&id) {
                debug!(id = %id, "Dropped unmatched ack");
            }
            Ok(())
        }
        InboundFrame::Topic(message) => match inbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LobsyncError::SlowConsumer { capacity }),
            Err(TrySendError::Closed(message)) => {
                debug!(topic = %message.topic, "Inbound queue closed, dropping message");
                Ok(())
            }
        },
    }
}
