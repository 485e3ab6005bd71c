//! Sequence synchronization between the diff stream and REST snapshots.
//!
//! Every diff event carries a sequence. An event is applied only when it
//! directly follows the book's sequence; older events are dropped and a
//! jump ahead means events were missed, so the book is rebuilt from a
//! fresh snapshot and the events held meanwhile are replayed over it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::book::{L3Snapshot, OrderBookL3, Sequence};
use crate::error::LobsyncError;
use crate::models::TopicMessage;
use crate::models::event::BookEvent;
use crate::websocket::{HandlerFuture, TopicHandler};

/// Where an incoming sequence falls relative to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Exactly `current + 1`.
    Next,
    /// At or behind `current`.
    Stale,
    /// Beyond `current + 1`.
    Gap,
}

/// Classifies `incoming` against the book's `current` sequence.
#[must_use]
pub fn classify(current: Sequence, incoming: Sequence) -> Step {
    if incoming <= current {
        Step::Stale
    } else if incoming == current.next() {
        Step::Next
    } else {
        Step::Gap
    }
}

/// Result of offering one event to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Applied; the book now sits at the event's sequence.
    Applied,
    /// Already covered by the book; nothing changed.
    Stale,
    /// Events are missing between the book and this one.
    Gap { expected: Sequence, received: Sequence },
    /// Held back until the resync in flight lands. Only [`BookSync`]
    /// reports this.
    Buffered,
}

/// Supplies full book snapshots for resynchronization.
pub trait SnapshotSource: Send + Sync {
    fn fetch_snapshot(&self, symbol: &str) -> impl Future<Output = Result<L3Snapshot>> + Send;
}

/// Events held during one resync. Past this the oldest are discarded and
/// the replay gaps, which fetches again.
const MAX_BUFFERED: usize = 65_536;

/// Pause before fetching again when a snapshot lands behind the buffer.
const REFETCH_DELAY: Duration = Duration::from_millis(250);

enum Phase {
    Live,
    Resyncing { buffered: Vec<BookEvent> },
    Failed(LobsyncError),
}

struct Shared<S> {
    book: Arc<OrderBookL3>,
    source: S,
    symbol: String,
    resyncs: AtomicU64,
    phase: Mutex<Phase>,
    resyncing: watch::Sender<bool>,
}

/// Keeps an [`OrderBookL3`] in step with a level-3 diff stream.
///
/// A gap starts a snapshot fetch on its own task. Events arriving until
/// it lands are buffered and replayed over the new baseline, so the
/// caller's dispatch loop never waits on the network.
pub struct BookSync<S> {
    shared: Arc<Shared<S>>,
}

impl<S: SnapshotSource + 'static> BookSync<S> {
    pub fn new(book: Arc<OrderBookL3>, source: S, symbol: impl Into<String>) -> Self {
        let (resyncing, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                book,
                source,
                symbol: symbol.into(),
                resyncs: AtomicU64::new(0),
                phase: Mutex::new(Phase::Live),
                resyncing,
            }),
        }
    }

    #[must_use]
    pub fn book(&self) -> &Arc<OrderBookL3> {
        &self.shared.book
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    /// Number of snapshot loads so far, including the initial one.
    #[must_use]
    pub fn resyncs(&self) -> u64 {
        self.shared.resyncs.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_resyncing(&self) -> bool {
        *self.shared.resyncing.borrow()
    }

    /// Waits until no background resync is in flight.
    pub async fn settled(&self) {
        let mut resyncing = self.shared.resyncing.subscribe();
        let _ = resyncing.wait_for(|busy| !*busy).await;
    }

    /// Replaces the book with a freshly fetched snapshot.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`LobsyncError::Book`] if the snapshot
    /// holds malformed orders; the book is left untouched in both cases.
    pub async fn resync(&self) -> Result<Sequence> {
        let snapshot = self.shared.source.fetch_snapshot(&self.shared.symbol).await?;
        let _phase = self.shared.phase();
        self.shared.install(&snapshot)
    }

    /// Applies one diff event without waiting on the network.
    ///
    /// A gap hands the event to a background resync and later events are
    /// buffered until it lands. A resync that failed is reported here, on
    /// the next event.
    ///
    /// # Errors
    ///
    /// Returns [`LobsyncError::Book`] if the event is malformed, or the
    /// error that ended the last background resync.
    pub fn on_event(&self, event: &BookEvent) -> Result<SyncOutcome> {
        let shared = &self.shared;
        let mut phase = shared.phase();
        match std::mem::replace(&mut *phase, Phase::Live) {
            Phase::Live => {}
            Phase::Failed(err) => return Err(err),
            Phase::Resyncing { mut buffered } => {
                if buffered.len() >= MAX_BUFFERED {
                    warn!(limit = MAX_BUFFERED, "Resync buffer full, discarding held events");
                    buffered.clear();
                }
                buffered.push(event.clone());
                *phase = Phase::Resyncing { buffered };
                return Ok(SyncOutcome::Buffered);
            }
        }

        match shared.book.apply_event(event)? {
            SyncOutcome::Gap { expected, received } => {
                warn!(%expected, %received, "Sequence gap, resynchronizing from snapshot");
                *phase = Phase::Resyncing {
                    buffered: vec![event.clone()],
                };
                shared.resyncing.send_replace(true);
                drop(phase);
                tokio::spawn(resync_in_background(Arc::clone(shared)));
                Ok(SyncOutcome::Gap { expected, received })
            }
            SyncOutcome::Stale => {
                debug!(sequence = %event.sequence, "Dropped stale event");
                Ok(SyncOutcome::Stale)
            }
            outcome => Ok(outcome),
        }
    }
}

impl<S: SnapshotSource> Shared<S> {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, snapshot: &L3Snapshot) -> Result<Sequence> {
        self.book.replace(snapshot)?;
        self.resyncs.fetch_add(1, Ordering::Relaxed);

        info!(
            symbol = %self.symbol,
            sequence = %snapshot.sequence,
            orders = self.book.len(),
            "Book loaded from snapshot"
        );
        Ok(snapshot.sequence)
    }

    /// Installs a fetched snapshot and replays the buffer over it. Returns
    /// `false` while the snapshot is still behind the buffered events.
    fn finish_resync(&self, fetched: Result<L3Snapshot>) -> bool {
        let mut phase = self.phase();
        let buffered = match std::mem::replace(&mut *phase, Phase::Live) {
            Phase::Resyncing { buffered } => buffered,
            other => {
                *phase = other;
                self.resyncing.send_replace(false);
                return true;
            }
        };

        if let Err(err) = fetched.and_then(|snapshot| self.install(&snapshot)) {
            error!(symbol = %self.symbol, error = %err, "Resync failed");
            *phase = Phase::Failed(err);
            self.resyncing.send_replace(false);
            return true;
        }

        let held = buffered.len();
        let remaining = self.replay(buffered);
        if remaining.is_empty() {
            debug!(replayed = held, "Replayed buffered events");
            self.resyncing.send_replace(false);
            return true;
        }

        *phase = Phase::Resyncing {
            buffered: remaining,
        };
        false
    }

    /// Offers buffered events in arrival order. Whatever follows a gap is
    /// handed back for the next attempt.
    fn replay(&self, buffered: Vec<BookEvent>) -> Vec<BookEvent> {
        let mut events = buffered.into_iter();
        while let Some(event) = events.next() {
            match self.book.apply_event(&event) {
                Ok(SyncOutcome::Gap { expected, received }) => {
                    warn!(%expected, %received, "Snapshot still behind the stream");
                    return std::iter::once(event).chain(events).collect();
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(sequence = %event.sequence, error = %err, "Rejected buffered event");
                }
            }
        }
        Vec::new()
    }
}

async fn resync_in_background<S: SnapshotSource>(shared: Arc<Shared<S>>) {
    loop {
        let fetched = shared.source.fetch_snapshot(&shared.symbol).await;
        if shared.finish_resync(fetched) {
            return;
        }
        tokio::time::sleep(REFETCH_DELAY).await;
    }
}

impl<S: SnapshotSource + 'static> TopicHandler for BookSync<S> {
    /// Malformed events are logged and skipped; the sequence does not
    /// advance, so the next event triggers a resync. Snapshot failures
    /// end the session.
    fn handle<'a>(&'a self, message: &'a TopicMessage) -> HandlerFuture<'a> {
        Box::pin(async move {
            let event = match BookEvent::deserialize(&message.data) {
                Ok(event) => event,
                Err(err) => {
                    warn!(topic = %message.topic, error = %err, "Skipping undecodable book event");
                    return Ok(());
                }
            };

            match self.on_event(&event) {
                Ok(_) => Ok(()),
                Err(LobsyncError::Book(err)) => {
                    warn!(sequence = %event.sequence, error = %err, "Rejected book event");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        })
    }
}
