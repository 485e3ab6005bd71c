//! Order book state reconstructed from the level-3 feed.
//!
//! - [`OrderBookL3`] holds every individual resting order, ordered by
//!   price-time priority on each side.
//! - [`OrderBookL2`] is a disposable price-level projection of an L3 book.
//! - [`Sequence`] is the server-assigned ordering token both books carry.

mod l2;
mod l3;
mod order;
mod sequence;
mod side;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use l2::{OrderBookL2, PriceLevel};
pub use l3::{L3Snapshot, OrderBookL3, OrderTuple};
pub use order::Order;
pub use sequence::Sequence;
pub use side::{BookSide, OrderKey};

/// Book side an order rests on.
///
/// The feed names sides after the taker direction of the resting order:
/// bids are `"buy"` orders and asks are `"sell"` orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "buy")]
    Bid,
    #[serde(rename = "sell")]
    Ask,
}

impl Side {
    /// Returns the wire-format side name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "buy",
            Side::Ask => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by individual book operations.
///
/// A rejected operation never leaves the book partially modified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookError {
    #[error("invalid {field} {value:?}: not a decimal")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("invalid {field} {value}: must not be negative")]
    NegativeSize { field: &'static str, value: Decimal },

    #[error("no {side} level at price {price}")]
    UnknownLevel { side: Side, price: Decimal },

    #[error("{side} level at price {price} holds {held}, cannot subtract {requested}")]
    NegativeLevel {
        side: Side,
        price: Decimal,
        held: Decimal,
        requested: Decimal,
    },
}
