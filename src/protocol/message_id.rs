use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used to match a response with its request.
///
/// Zero is reserved as the invalid sentinel: no request or response may
/// carry it. Ids are unique only among requests outstanding on one
/// connection and are reused after the counter wraps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(u32);

impl MessageId {
    /// The reserved "no id" value.
    pub const INVALID: MessageId = MessageId(0);

    /// Wrap a raw id.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// `false` for the reserved zero id.
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The id following this one, wrapping past `u32::MAX` to 1.
    pub const fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }
}

impl From<u32> for MessageId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_next_skips_zero_on_wrap() {
        // ---
        assert_eq!(MessageId::new(u32::MAX).next(), MessageId::new(1));
        assert_eq!(MessageId::INVALID.next(), MessageId::new(1));
        assert_eq!(MessageId::new(41).next(), MessageId::new(42));
    }

    #[test]
    fn test_validity() {
        // ---
        assert!(!MessageId::INVALID.is_valid());
        assert!(MessageId::new(1).is_valid());
    }

    #[test]
    fn test_serializes_as_bare_number() {
        // ---
        let json = serde_json::to_string(&MessageId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
