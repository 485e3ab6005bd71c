use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Server-assigned, monotonically increasing ordering token.
///
/// The REST snapshot and the diff stream both send sequences as JSON text
/// to avoid precision loss, so the value (de)serializes as a string.
/// Plain JSON numbers are accepted on input as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequence(pub u64);

impl Sequence {
    /// The sequence that directly follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Sequence(value)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Sequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SequenceVisitor;

        impl Visitor<'_> for SequenceVisitor {
            type Value = Sequence;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence number as text or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Sequence, E> {
                Ok(Sequence(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Sequence, E> {
                u64::try_from(v)
                    .map(Sequence)
                    .map_err(|_| E::custom(format!("negative sequence {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Sequence, E> {
                v.parse::<u64>()
                    .map(Sequence)
                    .map_err(|_| E::custom(format!("invalid sequence {v:?}")))
            }
        }

        deserializer.deserialize_any(SequenceVisitor)
    }
}
