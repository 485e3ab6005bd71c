//! Price-time ordered container for one side of an L3 book.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rust_decimal::Decimal;

use super::{Order, Side};

/// Ordering key of a resting order.
///
/// Keys compare by price first (ascending for asks, descending for bids)
/// and then by ascending creation time on both sides, so the first order
/// at a price level is always served first. Two keys with the same `id`
/// are equal regardless of price or time, which lets an order be removed
/// by its identity. Distinct ids that collide on both price and time fall
/// back to comparing ids to keep the order total.
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub side: Side,
    pub price: Decimal,
    pub time: i64,
    pub id: String,
}

impl From<&Order> for OrderKey {
    fn from(order: &Order) -> Self {
        Self {
            side: order.side,
            price: order.price,
            time: order.time,
            id: order.id.clone(),
        }
    }
}

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OrderKey {}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.id == other.id {
            return Ordering::Equal;
        }

        let by_price = match self.side {
            Side::Ask => self.price.cmp(&other.price),
            Side::Bid => other.price.cmp(&self.price),
        };

        by_price
            .then_with(|| self.time.cmp(&other.time))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// One side of an L3 book.
///
/// Holds only ordering keys; the orders themselves live in the book's id
/// index, so a removal from the index can never leave a dangling entry
/// behind as long as both are updated under the same lock.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    keys: BTreeSet<OrderKey>,
}

impl BookSide {
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            keys: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Inserts the order's key, replacing an existing entry for the same id.
    pub fn insert(&mut self, order: &Order) {
        debug_assert_eq!(order.side, self.side);
        self.keys.replace(OrderKey::from(order));
    }

    /// Removes the order's key. Returns `false` if it was not present.
    pub fn remove(&mut self, order: &Order) -> bool {
        self.keys.remove(&OrderKey::from(order))
    }

    /// Iterates keys from best to worst priority. Reverse it to walk from
    /// the deepest level towards the spread.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &OrderKey> {
        self.keys.iter()
    }

    /// The highest-priority key on this side.
    #[must_use]
    pub fn best(&self) -> Option<&OrderKey> {
        self.keys.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
