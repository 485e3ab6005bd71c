//! The level-3 order entity.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

use super::{BookError, Side};

/// A single resting order.
///
/// `id`, `side`, `price` and `time` are fixed for the order's lifetime;
/// only `size` changes, and an order whose size reaches zero is removed
/// from the book rather than kept around empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    /// Creation timestamp, used only to break ties between equal prices.
    pub time: i64,
}

impl Order {
    /// Builds an order from its wire-format text fields.
    ///
    /// # Errors
    ///
    /// Returns a [`BookError`] if `price` or `size` is not a decimal, if
    /// `size` is negative, or if `timestamp` is not a 64-bit integer.
    pub fn parse(
        id: &str,
        side: Side,
        price: &str,
        size: &str,
        timestamp: &str,
    ) -> Result<Self, BookError> {
        Ok(Self {
            id: id.to_string(),
            side,
            price: parse_decimal("price", price)?,
            size: parse_size("size", size)?,
            time: parse_timestamp(timestamp)?,
        })
    }
}

/// Serializes as the `(id, price, size, time)` text 4-tuple used by the
/// snapshot format.
impl Serialize for Order {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.id)?;
        tuple.serialize_element(&self.price.to_string())?;
        tuple.serialize_element(&self.size.to_string())?;
        tuple.serialize_element(&self.time.to_string())?;
        tuple.end()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}", self.id, self.price, self.size, self.time)
    }
}

pub(crate) fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, BookError> {
    Decimal::from_str(value).map_err(|_| BookError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}

/// Parses a size-like field, rejecting negative values.
pub(crate) fn parse_size(field: &'static str, value: &str) -> Result<Decimal, BookError> {
    let size = parse_decimal(field, value)?;
    if size.is_sign_negative() && !size.is_zero() {
        return Err(BookError::NegativeSize { field, value: size });
    }

    Ok(size)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<i64, BookError> {
    value
        .parse::<i64>()
        .map_err(|_| BookError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn parses_wire_fields() {
        let order = Order::parse("o1", Side::Bid, "10.05", "0.5", "1550653727731").unwrap();

        assert_eq!(order.id, "o1");
        assert_eq!(order.side, Side::Bid);
        assert_eq!(order.price, dec!(10.05));
        assert_eq!(order.size, dec!(0.5));
        assert_eq!(order.time, 1_550_653_727_731);
    }

    #[test]
    fn rejects_malformed_fields() {
        assert!(matches!(
            Order::parse("o1", Side::Ask, "ten", "1", "1"),
            Err(BookError::InvalidDecimal { field: "price", .. })
        ));
        assert!(matches!(
            Order::parse("o1", Side::Ask, "10", "", "1"),
            Err(BookError::InvalidDecimal { field: "size", .. })
        ));
        assert!(matches!(
            Order::parse("o1", Side::Ask, "10", "-1", "1"),
            Err(BookError::NegativeSize { .. })
        ));
        assert!(matches!(
            Order::parse("o1", Side::Ask, "10", "1", "1.5"),
            Err(BookError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn serializes_as_text_tuple() {
        let order = Order::parse("o1", Side::Ask, "10.05", "2.0", "3").unwrap();
        let json = serde_json::to_string(&order).unwrap();

        assert_eq!(json, r#"["o1","10.05","2.0","3"]"#);
    }
}
