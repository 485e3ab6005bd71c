//! Level-3 diff events delivered inside `/market/level3:{symbol}` payloads.

use serde::Deserialize;

use crate::book::{Sequence, Side};

/// Lifecycle stage reported by a diff event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Order accepted by the engine; no book effect yet.
    Received,
    /// Order now rests on the book.
    Open,
    /// Order left the book (filled or cancelled).
    Done,
    /// A taker traded against a resting maker order.
    Match,
    /// Resting order size changed in place.
    Change,
}

/// One incremental book event.
///
/// Every decimal and timestamp arrives as text; fields irrelevant to the
/// event type are absent on the wire and default to empty strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEvent {
    pub sequence: Sequence,
    #[serde(rename = "type")]
    pub tpe: EventType,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub maker_order_id: String,
    #[serde(default)]
    pub new_size: String,
    #[serde(default)]
    pub old_size: String,
}
