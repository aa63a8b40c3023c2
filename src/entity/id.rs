use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored reservation
///
/// Wraps the integer key assigned by the identity sequence. The wrapper does
/// not validate the range: zero and negative values are representable, the
/// store simply never hands them out with the default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(i64);

impl ReservationId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw key value
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ReservationId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<ReservationId> for i64 {
    fn from(id: ReservationId) -> Self {
        id.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReservationId{{value={}}}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_value_roundtrip() {
        let id = ReservationId::new(123);
        assert_eq!(id.value(), 123);
        assert_eq!(i64::from(id), 123);
        assert_eq!(ReservationId::from(456).value(), 456);
    }

    #[test]
    fn test_zero_is_representable() {
        assert_eq!(ReservationId::new(0).value(), 0);
    }

    #[test]
    fn test_equality_and_hash() {
        assert_eq!(ReservationId::new(123), ReservationId::new(123));
        assert_ne!(ReservationId::new(123), ReservationId::new(456));

        let mut set = HashSet::new();
        set.insert(ReservationId::new(123));
        set.insert(ReservationId::new(123));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(ReservationId::new(123).to_string(), "ReservationId{value=123}");
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&ReservationId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: ReservationId = serde_json::from_str("42").unwrap();
        assert_eq!(back, ReservationId::new(42));
    }
}
