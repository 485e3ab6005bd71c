//! Full-depth (L3) order book.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::order::parse_size;
use super::{BookError, BookSide, Order, OrderBookL2, Sequence, Side};
use crate::models::event::{BookEvent, EventType};
use crate::sync::{self, Step, SyncOutcome};

/// One order in snapshot form: `(id, price, size, time)`, all as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTuple(pub String, pub String, pub String, pub String);

impl From<&Order> for OrderTuple {
    fn from(order: &Order) -> Self {
        Self(
            order.id.clone(),
            order.price.to_string(),
            order.size.to_string(),
            order.time.to_string(),
        )
    }
}

/// Point-in-time copy of a full L3 book, as served by the snapshot
/// endpoint and produced by [`OrderBookL3::snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L3Snapshot {
    pub sequence: Sequence,
    #[serde(default)]
    pub asks: Vec<OrderTuple>,
    #[serde(default)]
    pub bids: Vec<OrderTuple>,
    #[serde(default)]
    pub time: i64,
}

#[derive(Debug)]
struct Inner {
    sequence: Sequence,
    time: i64,
    /// Owns every live order; both sides index into it by id.
    orders: HashMap<String, Order>,
    asks: BookSide,
    bids: BookSide,
}

impl Inner {
    fn new(sequence: Sequence, time: i64) -> Self {
        Self {
            sequence,
            time,
            orders: HashMap::new(),
            asks: BookSide::new(Side::Ask),
            bids: BookSide::new(Side::Bid),
        }
    }

    fn from_snapshot(snapshot: &L3Snapshot) -> Result<Self, BookError> {
        let mut inner = Inner::new(snapshot.sequence, snapshot.time);
        for (side, tuples) in [(Side::Ask, &snapshot.asks), (Side::Bid, &snapshot.bids)] {
            for OrderTuple(id, price, size, time) in tuples {
                inner.add(id, side, price, size, time)?;
            }
        }

        Ok(inner)
    }

    fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Ask => &self.asks,
            Side::Bid => &self.bids,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Ask => &mut self.asks,
            Side::Bid => &mut self.bids,
        }
    }

    /// Orders on `side` from best to worst priority.
    fn ranked(&self, side: Side) -> impl DoubleEndedIterator<Item = &Order> {
        let orders = &self.orders;
        self.side(side)
            .iter()
            .filter_map(move |key| orders.get(&key.id))
    }

    fn insert(&mut self, order: Order) {
        if let Some(previous) = self.orders.remove(&order.id) {
            self.side_mut(previous.side).remove(&previous);
        }
        self.side_mut(order.side).insert(&order);
        self.orders.insert(order.id.clone(), order);
    }

    fn remove(&mut self, id: &str) -> Option<Order> {
        let order = self.orders.remove(id)?;
        self.side_mut(order.side).remove(&order);
        Some(order)
    }

    fn add(
        &mut self,
        id: &str,
        side: Side,
        price: &str,
        size: &str,
        timestamp: &str,
    ) -> Result<(), BookError> {
        if size == "0" || price.is_empty() {
            return Ok(());
        }

        let order = Order::parse(id, side, price, size, timestamp)?;
        if order.size.is_zero() {
            return Ok(());
        }
        self.insert(order);

        Ok(())
    }

    /// Sets the size of a live order in place, removing it at or below zero.
    ///
    /// The ordering key (price, time, id) is untouched, so the side
    /// container needs no re-insertion.
    fn resize(&mut self, id: &str, size: Decimal) {
        if size <= Decimal::ZERO {
            self.remove(id);
        } else if let Some(order) = self.orders.get_mut(id) {
            order.size = size;
        }
    }

    fn set_size(&mut self, id: &str, new_size: &str) -> Result<(), BookError> {
        if !self.orders.contains_key(id) {
            return Ok(());
        }

        let size = parse_size("newSize", new_size)?;
        self.resize(id, size);

        Ok(())
    }

    fn subtract_size(&mut self, id: &str, amount: &str) -> Result<(), BookError> {
        let Some(current) = self.orders.get(id).map(|order| order.size) else {
            return Ok(());
        };

        let amount = parse_size("size", amount)?;
        let remaining = current - amount;
        if remaining < Decimal::ZERO {
            warn!(
                order_id = id,
                size = %current,
                matched = %amount,
                "Match exceeds resting size, removing order"
            );
        }
        self.resize(id, remaining);

        Ok(())
    }

    /// Maps a diff event onto a single book mutation.
    fn apply(&mut self, event: &BookEvent) -> Result<(), BookError> {
        match event.tpe {
            EventType::Received => Ok(()),
            EventType::Open => {
                let side = event.side.ok_or(BookError::MissingField("side"))?;
                self.add(&event.order_id, side, &event.price, &event.size, &event.time)
            }
            EventType::Done => {
                self.remove(&event.order_id);
                Ok(())
            }
            EventType::Change => self.set_size(&event.order_id, &event.new_size),
            EventType::Match => self.subtract_size(&event.maker_order_id, &event.size),
        }
    }
}

/// Full-depth order book for one symbol.
///
/// Every individual order is kept, ordered by price-time priority on its
/// side, with an id index shared by both sides. All state sits behind one
/// reader-writer lock: mutators take it exclusively, queries share it, so
/// a rendering task can read while the feed task writes.
#[derive(Debug)]
pub struct OrderBookL3 {
    inner: RwLock<Inner>,
}

impl Default for OrderBookL3 {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookL3 {
    /// Creates an empty book at sequence zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new(Sequence::default(), now_nanos())),
        }
    }

    /// Builds a book from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if any snapshot order fails to parse.
    pub fn from_snapshot(snapshot: &L3Snapshot) -> Result<Self, BookError> {
        Ok(Self {
            inner: RwLock::new(Inner::from_snapshot(snapshot)?),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the whole book, sequence included, with `snapshot`.
    ///
    /// The snapshot is parsed before the lock is taken, so a malformed
    /// snapshot leaves the current book untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if any snapshot order fails to parse.
    pub fn replace(&self, snapshot: &L3Snapshot) -> Result<(), BookError> {
        let fresh = Inner::from_snapshot(snapshot)?;
        let orders = fresh.orders.len();
        *self.write() = fresh;
        debug!(sequence = %snapshot.sequence, orders, "Replaced book from snapshot");

        Ok(())
    }

    /// Copies the book into its serializable snapshot form.
    #[must_use]
    pub fn snapshot(&self) -> L3Snapshot {
        let inner = self.read();
        L3Snapshot {
            sequence: inner.sequence,
            asks: inner.ranked(Side::Ask).map(OrderTuple::from).collect(),
            bids: inner.ranked(Side::Bid).map(OrderTuple::from).collect(),
            time: inner.time,
        }
    }

    /// Adds a new resting order.
    ///
    /// Does nothing when `size` is `"0"` or `price` is empty, which is how
    /// zero-intent events show up on the feed.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if `price`, `size` or `timestamp` is malformed.
    pub fn add(
        &self,
        id: &str,
        side: Side,
        price: &str,
        size: &str,
        timestamp: &str,
    ) -> Result<(), BookError> {
        self.write().add(id, side, price, size, timestamp)
    }

    /// Removes an order. Unknown ids are ignored.
    pub fn delete(&self, id: &str) {
        self.write().remove(id);
    }

    /// Sets the size of a live order; zero removes it. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if `new_size` is malformed or negative.
    pub fn set_size(&self, id: &str, new_size: &str) -> Result<(), BookError> {
        self.write().set_size(id, new_size)
    }

    /// Reduces a live order by `amount`; reaching zero removes it.
    /// Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if `amount` is malformed or negative.
    pub fn subtract_size(&self, id: &str, amount: &str) -> Result<(), BookError> {
        self.write().subtract_size(id, amount)
    }

    /// Looks up a live order by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Order> {
        self.read().orders.get(id).cloned()
    }

    #[must_use]
    pub fn sequence(&self) -> Sequence {
        self.read().sequence
    }

    pub fn set_sequence(&self, sequence: Sequence) {
        self.write().sequence = sequence;
    }

    /// Time of the snapshot this book was built from, in the snapshot's units.
    #[must_use]
    pub fn time(&self) -> i64 {
        self.read().time
    }

    /// Total number of live orders across both sides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().orders.is_empty()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Order> {
        self.read().ranked(Side::Ask).next().cloned()
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Order> {
        self.read().ranked(Side::Bid).next().cloned()
    }

    /// Returns up to `n` orders per side.
    ///
    /// Asks run from the deepest order down to the best ask and bids from
    /// the best bid down, so printing asks then bids shows the spread in
    /// the middle.
    #[must_use]
    pub fn top_levels(&self, n: usize) -> (Vec<Order>, Vec<Order>) {
        let inner = self.read();
        let mut asks: Vec<_> = inner.ranked(Side::Ask).take(n).cloned().collect();
        asks.reverse();
        let bids = inner.ranked(Side::Bid).take(n).cloned().collect();
        (asks, bids)
    }

    /// Aggregates the book by price into a fresh [`OrderBookL2`].
    #[must_use]
    pub fn to_l2(&self) -> OrderBookL2 {
        let inner = self.read();
        let mut l2 = OrderBookL2::new(inner.sequence, inner.time);
        for side in [Side::Ask, Side::Bid] {
            for order in inner.ranked(side) {
                l2.add(side, order.price, order.size);
            }
        }
        l2
    }

    /// Checks `event` against the current sequence and, when it is the
    /// next one, applies it and advances the sequence, all under one
    /// write lock.
    ///
    /// A malformed event is rejected without advancing the sequence, so
    /// the following event surfaces as a gap.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if the event's fields fail to parse.
    pub fn apply_event(&self, event: &BookEvent) -> Result<SyncOutcome, BookError> {
        let mut inner = self.write();
        match sync::classify(inner.sequence, event.sequence) {
            Step::Next => {
                inner.apply(event)?;
                inner.sequence = event.sequence;
                Ok(SyncOutcome::Applied)
            }
            Step::Stale => Ok(SyncOutcome::Stale),
            Step::Gap => Ok(SyncOutcome::Gap {
                expected: inner.sequence.next(),
                received: event.sequence,
            }),
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn ids(orders: &[Order]) -> Vec<&str> {
        orders.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn zero_intent_add_is_ignored() {
        let book = OrderBookL3::new();
        book.add("a", Side::Bid, "10", "0", "1").unwrap();
        book.add("b", Side::Bid, "", "1", "1").unwrap();

        assert!(book.is_empty());
    }

    #[test]
    fn malformed_add_leaves_book_untouched() {
        let book = OrderBookL3::new();
        book.add("a", Side::Bid, "10", "1", "1").unwrap();

        assert!(book.add("b", Side::Bid, "x", "1", "1").is_err());
        assert!(book.add("c", Side::Bid, "10", "1", "later").is_err());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn readding_an_id_replaces_the_order() {
        let book = OrderBookL3::new();
        book.add("a", Side::Bid, "10", "1", "1").unwrap();
        book.add("a", Side::Ask, "11", "2", "2").unwrap();

        let (asks, bids) = book.top_levels(5);
        assert_eq!(ids(&asks), ["a"]);
        assert!(bids.is_empty());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn delete_unknown_id_is_noop() {
        let book = OrderBookL3::new();
        book.add("a", Side::Ask, "10", "1", "1").unwrap();
        book.delete("missing");
        book.delete("a");
        book.delete("a");

        assert!(book.is_empty());
    }

    #[test]
    fn set_size_updates_in_place_and_evicts_at_zero() {
        let book = OrderBookL3::new();
        book.add("a", Side::Ask, "10", "1", "1").unwrap();
        book.add("b", Side::Ask, "10", "1", "2").unwrap();

        book.set_size("a", "0.25").unwrap();
        assert_eq!(book.get("a").map(|o| o.size), Some(dec!(0.25)));
        assert_eq!(ids(&book.top_levels(5).0), ["b", "a"]);

        book.set_size("a", "0").unwrap();
        assert!(book.get("a").is_none());
        assert_eq!(ids(&book.top_levels(5).0), ["b"]);
    }

    #[test]
    fn set_size_rejects_malformed_input() {
        let book = OrderBookL3::new();
        book.add("a", Side::Ask, "10", "1", "1").unwrap();

        assert!(book.set_size("a", "abc").is_err());
        assert!(book.set_size("a", "-1").is_err());
        assert_eq!(book.get("a").map(|o| o.size), Some(dec!(1)));
        assert!(book.set_size("missing", "abc").is_ok());
    }

    #[test]
    fn subtract_size_evicts_at_zero_and_on_overfill() {
        let book = OrderBookL3::new();
        book.add("a", Side::Bid, "10", "1.0", "1").unwrap();
        book.add("b", Side::Bid, "10", "0.5", "2").unwrap();

        book.subtract_size("a", "0.4").unwrap();
        assert_eq!(book.get("a").map(|o| o.size), Some(dec!(0.6)));

        book.subtract_size("a", "0.6").unwrap();
        assert!(book.get("a").is_none());

        book.subtract_size("b", "0.7").unwrap();
        assert!(book.is_empty());
    }

    #[test]
    fn top_levels_orientation() {
        let book = OrderBookL3::new();
        book.add("a1", Side::Ask, "11", "1", "1").unwrap();
        book.add("a2", Side::Ask, "12", "1", "2").unwrap();
        book.add("a3", Side::Ask, "13", "1", "3").unwrap();
        book.add("b1", Side::Bid, "9", "1", "4").unwrap();
        book.add("b2", Side::Bid, "8", "1", "5").unwrap();

        let (asks, bids) = book.top_levels(2);
        assert_eq!(ids(&asks), ["a2", "a1"]);
        assert_eq!(ids(&bids), ["b1", "b2"]);
        assert_eq!(book.best_ask().map(|o| o.id), Some("a1".to_string()));
        assert_eq!(book.best_bid().map(|o| o.id), Some("b1".to_string()));
    }

    #[test]
    fn snapshot_round_trips_through_replace() {
        let book = OrderBookL3::new();
        book.add("a", Side::Ask, "10.05", "2.0", "3").unwrap();
        book.add("b", Side::Bid, "10.00", "1.0", "1").unwrap();
        book.set_sequence(Sequence(7));

        let copy = OrderBookL3::new();
        copy.replace(&book.snapshot()).unwrap();

        assert_eq!(copy.snapshot(), book.snapshot());
        assert_eq!(copy.sequence(), Sequence(7));
    }

    #[test]
    fn malformed_snapshot_keeps_current_book() {
        let book = OrderBookL3::new();
        book.add("a", Side::Ask, "10", "1", "1").unwrap();
        book.set_sequence(Sequence(5));

        let bad = L3Snapshot {
            sequence: Sequence(50),
            asks: vec![OrderTuple("x".into(), "nope".into(), "1".into(), "1".into())],
            bids: Vec::new(),
            time: 0,
        };

        assert!(book.replace(&bad).is_err());
        assert_eq!(book.sequence(), Sequence(5));
        assert!(book.get("a").is_some());
    }
}
