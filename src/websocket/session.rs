//! Session lifecycle: handshake, background duties and shutdown.
//!
//! A running session owns three duties, each on its own task:
//! the writer drains the outbound queue onto the socket, the reader
//! classifies frames and fans them out, and the heartbeat pings the server
//! on a fixed interval. The first duty to fail records its error and
//! cancels the others; [`Session::listen`] then returns that error.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tungstenite::Message;

use crate::Result;
use crate::config::SessionConfig;
use crate::error::LobsyncError;
use crate::models::{ControlRequest, InboundFrame, TopicMessage};

use super::handler::{self, HandlerRegistry};
use super::pending::PendingRegistry;
use super::{WsReader, WsWriter, next_request_id};

/// Time allowed for the close frame to go out on shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Client heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Delay between pings.
    pub interval: Duration,
    /// Longest wait for the matching pong.
    pub timeout: Duration,
}

/// Lifecycle of a session. Transitions only move forward.
///
/// [`Session::connect`] passes through `Connecting` and `Handshaking`
/// before a [`Session`] exists, so those two only show up in its log
/// fields. [`Session::state`] starts at `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Transport connect in progress.
    Connecting = 0,
    /// Connected, waiting for the welcome frame.
    Handshaking = 1,
    Running = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Handshaking,
            2 => SessionState::Running,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// State shared between the session handle and its duties.
struct Shared {
    state: AtomicU8,
    cancel: CancellationToken,
    acks: PendingRegistry,
    pongs: PendingRegistry,
    handlers: HandlerRegistry,
    errors: mpsc::Sender<LobsyncError>,
}

impl Shared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `Closing`, cancels the duties and fails pending waits.
    /// Only the first call has any effect.
    fn close(&self) -> bool {
        if self
            .state
            .compare_exchange(
                SessionState::Running as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        info!("Closing session");
        self.cancel.cancel();
        self.acks.clear();
        self.pongs.clear();
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        true
    }

    /// Records the first fatal error and shuts the session down.
    fn fail(&self, duty: &'static str, err: LobsyncError) {
        if self.cancel.is_cancelled() {
            debug!(duty, error = %err, "Duty error after shutdown");
            return;
        }
        error!(duty, error = %err, "Session duty failed");
        // Capacity one: later failures are consequences of the first.
        let _ = self.errors.try_send(err);
        self.close();
    }
}

/// Receivers drained by [`Session::listen`].
struct Receivers {
    inbound: mpsc::Receiver<TopicMessage>,
    errors: mpsc::Receiver<LobsyncError>,
}

/// A live, handshaken websocket session.
///
/// Control requests are issued through the methods in the subscription
/// module; topic payloads are delivered by [`Session::listen`].
pub struct Session {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<ControlRequest>,
    receivers: tokio::sync::Mutex<Receivers>,
    config: SessionConfig,
    duties: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Connects to `url`, waits for the server's `welcome` and starts the
    /// session duties.
    ///
    /// # Errors
    ///
    /// Fails if the transport can't be opened, the server answers with an
    /// `error` frame or anything but `welcome`, or the handshake exceeds
    /// the configured timeout.
    pub async fn connect(url: &str, heartbeat: Heartbeat, config: SessionConfig) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(LobsyncError::Config(
                "queue capacity must be at least 1".into(),
            ));
        }

        info!(state = ?SessionState::Connecting, "Connecting session");
        let (write, mut read) = timeout(config.handshake_timeout, super::connect(url))
            .await
            .map_err(|_| handshake_timed_out(config.handshake_timeout))??;

        debug!(state = ?SessionState::Handshaking, "Waiting for welcome");
        let first = timeout(config.handshake_timeout, next_frame(&mut read))
            .await
            .map_err(|_| handshake_timed_out(config.handshake_timeout))??;

        match first {
            InboundFrame::Welcome { id } => {
                info!(id = %id, "Session welcomed");
            }
            InboundFrame::Error { code, message, .. } => {
                warn!(code, message = %message, "Handshake rejected");
                return Err(LobsyncError::Server { code, message });
            }
            other => {
                return Err(LobsyncError::Protocol(format!(
                    "expected welcome, got {other:?}"
                )));
            }
        }

        Ok(Self::start(write, read, heartbeat, config))
    }

    fn start(write: WsWriter, read: WsReader, heartbeat: Heartbeat, config: SessionConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity);
        let (errors_tx, errors_rx) = mpsc::channel(1);

        let shared = Arc::new(Shared {
            state: AtomicU8::new(SessionState::Running as u8),
            cancel: CancellationToken::new(),
            acks: PendingRegistry::new(),
            pongs: PendingRegistry::new(),
            handlers: HandlerRegistry::default(),
            errors: errors_tx,
        });

        let duties = vec![
            spawn_duty(
                &shared,
                "writer",
                write_loop(write, outbound_rx, shared.cancel.clone()),
            ),
            spawn_duty(
                &shared,
                "reader",
                read_loop(read, Arc::clone(&shared), inbound_tx, config.queue_capacity),
            ),
            spawn_duty(
                &shared,
                "heartbeat",
                heartbeat_loop(Arc::clone(&shared), outbound_tx.clone(), heartbeat),
            ),
        ];

        info!(
            state = ?SessionState::Running,
            interval_ms = u64::try_from(heartbeat.interval.as_millis()).unwrap_or(u64::MAX),
            capacity = config.queue_capacity,
            "Session running"
        );

        Self {
            shared,
            outbound: outbound_tx,
            receivers: tokio::sync::Mutex::new(Receivers {
                inbound: inbound_rx,
                errors: errors_rx,
            }),
            config,
            duties: Mutex::new(duties),
        }
    }

    /// Current lifecycle state; `Running` until the session closes.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Delivers topic payloads to their handlers until the session ends.
    ///
    /// Returns `Ok(())` after [`Session::close`], or the error that ended
    /// the session: a failed duty, a fatal server frame, or an error from a
    /// handler. Messages for topics without a handler are dropped.
    pub async fn listen(&self) -> Result<()> {
        let mut receivers = self.receivers.lock().await;
        let Receivers { inbound, errors } = &mut *receivers;

        let result = loop {
            tokio::select! {
                biased;
                Some(err) = errors.recv() => break Err(err),
                () = self.shared.cancel.cancelled() => break Ok(()),
                message = inbound.recv() => match message {
                    Some(message) => {
                        if let Err(err) = self.dispatch(message).await {
                            error!(error = %err, "Handler failed");
                            break Err(err);
                        }
                    }
                    None => break Ok(()),
                },
            }
        };

        self.close();
        result
    }

    async fn dispatch(&self, message: TopicMessage) -> Result<()> {
        let Some(handler) = self.shared.handlers.get(&message.topic) else {
            warn!(topic = %message.topic, "Dropping message for unknown topic");
            return Ok(());
        };
        handler.handle(&message).await
    }

    /// Stops the session. Pending waits fail with [`LobsyncError::Closed`],
    /// a running [`Session::listen`] returns `Ok(())`, and the transport is
    /// released. Calling it again does nothing.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Closes the session and waits for every duty to finish.
    pub async fn shutdown(&self) {
        self.close();
        let duties = std::mem::take(
            &mut *self
                .duties
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for duty in duties {
            let _ = duty.await;
        }
    }

    pub(super) fn ensure_running(&self) -> Result<()> {
        match self.state() {
            SessionState::Running => Ok(()),
            _ => Err(LobsyncError::Closed),
        }
    }

    pub(super) fn outbound(&self) -> &mpsc::Sender<ControlRequest> {
        &self.outbound
    }

    pub(super) fn acks(&self) -> &PendingRegistry {
        &self.shared.acks
    }

    pub(super) fn handlers(&self) -> &HandlerRegistry {
        &self.shared.handlers
    }

    pub(super) fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.close();
    }
}

fn handshake_timed_out(limit: Duration) -> LobsyncError {
    LobsyncError::WebSocket(tungstenite::Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("handshake not completed within {limit:?}"),
    )))
}

fn spawn_duty<F>(shared: &Arc<Shared>, name: &'static str, duty: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        match duty.await {
            Ok(()) => debug!(duty = name, "Duty stopped"),
            Err(err) => shared.fail(name, err),
        }
    })
}

/// Reads until the next text frame and classifies it.
async fn next_frame(read: &mut WsReader) -> Result<InboundFrame> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return InboundFrame::parse(&text),
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Server closed connection");
                return Err(tungstenite::Error::ConnectionClosed.into());
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
            None => return Err(tungstenite::Error::ConnectionClosed.into()),
        }
    }
}

async fn write_loop(
    mut write: WsWriter,
    mut outbound: mpsc::Receiver<ControlRequest>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let request = tokio::select! {
            () = cancel.cancelled() => break,
            request = outbound.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let json = serde_json::to_string(&request)?;
        debug!(id = %request.id, tpe = request.tpe.as_str(), "Sending control request");
        write.send(Message::Text(json.into())).await?;
    }

    if timeout(CLOSE_TIMEOUT, write.close()).await.is_err() {
        debug!("Close frame not flushed in time");
    }
    Ok(())
}

async fn read_loop(
    mut read: WsReader,
    shared: Arc<Shared>,
    inbound: mpsc::Sender<TopicMessage>,
    capacity: usize,
) -> Result<()> {
    loop {
        let frame = tokio::select! {
            () = shared.cancel.cancelled() => return Ok(()),
            frame = next_frame(&mut read) => frame?,
        };
        handler::route(frame, &shared.acks, &shared.pongs, &inbound, capacity)?;
    }
}

async fn heartbeat_loop(
    shared: Arc<Shared>,
    outbound: mpsc::Sender<ControlRequest>,
    heartbeat: Heartbeat,
) -> Result<()> {
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let id = next_request_id();
        let pending = shared.pongs.register(&id);
        outbound
            .send(ControlRequest::ping(id))
            .await
            .map_err(|_| LobsyncError::Closed)?;

        tokio::select! {
            () = shared.cancel.cancelled() => return Ok(()),
            result = pending.wait(heartbeat.timeout) => result?,
        }
        debug!("Heartbeat acknowledged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            SessionState::Connecting,
            SessionState::Handshaking,
            SessionState::Running,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }
}
