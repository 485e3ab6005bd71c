//! Price-level (L2) projection of an L3 book.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use super::{BookError, Sequence, Side};

/// Cumulative size resting at one price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.price, self.size)
    }
}

#[derive(Debug, Clone)]
struct Levels {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl Levels {
    fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Walks levels from best to worst price.
    fn by_priority(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let to_level = |(price, size): (&Decimal, &Decimal)| PriceLevel {
            price: *price,
            size: *size,
        };
        match self.side {
            Side::Ask => Box::new(self.levels.iter().map(to_level)),
            Side::Bid => Box::new(self.levels.iter().rev().map(to_level)),
        }
    }

    fn add(&mut self, price: Decimal, size: Decimal) {
        let level = self.levels.entry(price).or_insert(Decimal::ZERO);
        *level += size;
        if level.is_zero() {
            self.levels.remove(&price);
        }
    }

    fn subtract(&mut self, price: Decimal, size: Decimal) -> Result<(), BookError> {
        let Some(held) = self.levels.get_mut(&price) else {
            return Err(BookError::UnknownLevel {
                side: self.side,
                price,
            });
        };

        if size > *held {
            return Err(BookError::NegativeLevel {
                side: self.side,
                price,
                held: *held,
                requested: size,
            });
        }

        *held -= size;
        if held.is_zero() {
            self.levels.remove(&price);
        }

        Ok(())
    }
}

/// Aggregated order book: price → cumulative size per side.
///
/// Produced by [`OrderBookL3::to_l2`](super::OrderBookL3::to_l2) as a
/// read-only snapshot of the moment; it is never fed by the protocol
/// directly.
#[derive(Debug, Clone)]
pub struct OrderBookL2 {
    pub sequence: Sequence,
    pub time: i64,
    asks: Levels,
    bids: Levels,
}

impl OrderBookL2 {
    #[must_use]
    pub fn new(sequence: Sequence, time: i64) -> Self {
        Self {
            sequence,
            time,
            asks: Levels::new(Side::Ask),
            bids: Levels::new(Side::Bid),
        }
    }

    fn levels(&self, side: Side) -> &Levels {
        match side {
            Side::Ask => &self.asks,
            Side::Bid => &self.bids,
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut Levels {
        match side {
            Side::Ask => &mut self.asks,
            Side::Bid => &mut self.bids,
        }
    }

    /// Adds `size` to the level at `price`, creating it if needed.
    pub fn add(&mut self, side: Side, price: Decimal, size: Decimal) {
        self.levels_mut(side).add(price, size);
    }

    /// Subtracts `size` from an existing level, removing it at zero.
    ///
    /// # Errors
    ///
    /// Returns [`BookError::UnknownLevel`] if no level exists at `price`,
    /// or [`BookError::NegativeLevel`] if `size` exceeds what the level
    /// holds. The book is left unchanged in both cases.
    pub fn subtract(&mut self, side: Side, price: Decimal, size: Decimal) -> Result<(), BookError> {
        self.levels_mut(side).subtract(price, size)
    }

    /// Cumulative size at `price`, if the level exists.
    #[must_use]
    pub fn level(&self, side: Side, price: Decimal) -> Option<Decimal> {
        self.levels(side).levels.get(&price).copied()
    }

    /// Number of price levels on `side`.
    #[must_use]
    pub fn depth(&self, side: Side) -> usize {
        self.levels(side).levels.len()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.by_priority().next()
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.by_priority().next()
    }

    /// Returns up to `n` levels per side.
    ///
    /// Asks run from the deepest level down to the best ask and bids from
    /// the best bid down, so printing asks then bids shows the spread in
    /// the middle.
    #[must_use]
    pub fn top_levels(&self, n: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let mut asks: Vec<_> = self.asks.by_priority().take(n).collect();
        asks.reverse();
        let bids = self.bids.by_priority().take(n).collect();
        (asks, bids)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn add_accumulates_per_price() {
        let mut book = OrderBookL2::new(Sequence(1), 0);
        book.add(Side::Bid, dec!(10), dec!(1.0));
        book.add(Side::Bid, dec!(10), dec!(0.5));
        book.add(Side::Bid, dec!(9), dec!(2));

        assert_eq!(book.level(Side::Bid, dec!(10)), Some(dec!(1.5)));
        assert_eq!(book.depth(Side::Bid), 2);
        assert_eq!(book.depth(Side::Ask), 0);
    }

    #[test]
    fn subtract_to_zero_removes_level() {
        let mut book = OrderBookL2::new(Sequence(1), 0);
        book.add(Side::Ask, dec!(10.05), dec!(2.0));
        book.subtract(Side::Ask, dec!(10.05), dec!(0.5)).unwrap();
        assert_eq!(book.level(Side::Ask, dec!(10.05)), Some(dec!(1.5)));

        book.subtract(Side::Ask, dec!(10.05), dec!(1.5)).unwrap();
        assert_eq!(book.level(Side::Ask, dec!(10.05)), None);
    }

    #[test]
    fn subtract_from_absent_level_is_rejected() {
        let mut book = OrderBookL2::new(Sequence(1), 0);
        let err = book.subtract(Side::Bid, dec!(10), dec!(1)).unwrap_err();

        assert!(matches!(err, BookError::UnknownLevel { side: Side::Bid, .. }));
        assert_eq!(book.depth(Side::Bid), 0);
    }

    #[test]
    fn oversized_subtract_is_rejected_untouched() {
        let mut book = OrderBookL2::new(Sequence(1), 0);
        book.add(Side::Bid, dec!(10), dec!(1));
        let err = book.subtract(Side::Bid, dec!(10), dec!(2)).unwrap_err();

        assert!(matches!(err, BookError::NegativeLevel { .. }));
        assert_eq!(book.level(Side::Bid, dec!(10)), Some(dec!(1)));
    }

    #[test]
    fn top_levels_face_the_spread() {
        let mut book = OrderBookL2::new(Sequence(1), 0);
        for price in [dec!(101), dec!(102), dec!(103)] {
            book.add(Side::Ask, price, dec!(1));
        }
        for price in [dec!(99), dec!(98), dec!(97)] {
            book.add(Side::Bid, price, dec!(1));
        }

        let (asks, bids) = book.top_levels(2);
        let ask_prices: Vec<_> = asks.iter().map(|l| l.price).collect();
        let bid_prices: Vec<_> = bids.iter().map(|l| l.price).collect();

        assert_eq!(ask_prices, [dec!(102), dec!(101)]);
        assert_eq!(bid_prices, [dec!(99), dec!(98)]);
        assert_eq!(book.best_ask().map(|l| l.price), Some(dec!(101)));
        assert_eq!(book.best_bid().map(|l| l.price), Some(dec!(99)));
    }
}
