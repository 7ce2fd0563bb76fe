//! The text value held by a binding.

use alloc::string::{String, ToString};
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;

use crate::coerce::{self, Comparable};

/// The value of a binding before any message was received or published.
pub const NO_MESSAGE_RECEIVED: &str = "NO_MESSAGE_RECEIVED";

/// A snapshot of a topic's value in wire format.
///
/// Comparisons follow [`coerce`](crate::coerce): a value compares
/// numerically against numbers and numeric text, and textually otherwise.
///
/// ```
/// use myrtio_mqtt_binding::TopicValue;
///
/// let value = TopicValue::from("85");
/// assert!(value > 72);
/// assert!(value == 85.0);
/// assert!(value == "85.0");
/// assert!(TopicValue::from("ON") == "ON");
/// ```
#[derive(Clone, Debug)]
pub struct TopicValue(String);

impl TopicValue {
    /// The placeholder value of a binding that has not seen any message yet.
    pub fn unset() -> Self {
        Self(String::from(NO_MESSAGE_RECEIVED))
    }

    /// Returns `true` unless this is the [`NO_MESSAGE_RECEIVED`] placeholder.
    pub fn is_set(&self) -> bool {
        self.0 != NO_MESSAGE_RECEIVED
    }

    /// The value as wire text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The value as payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The comparable form of the value.
    pub fn comparable(&self) -> Comparable<'_> {
        coerce::to_comparable(&self.0)
    }

    /// The numeric value, if the text parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        coerce::parse_number(&self.0)
    }

    /// Consumes the value, returning the wire text.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Decodes a payload received from the transport. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self(String::from_utf8_lossy(payload).into_owned())
    }
}

impl Default for TopicValue {
    fn default() -> Self {
        Self::unset()
    }
}

impl Deref for TopicValue {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TopicValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicValue {
    fn from(value: &str) -> Self {
        Self(String::from(value))
    }
}

impl From<String> for TopicValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for TopicValue {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

impl From<bool> for TopicValue {
    fn from(value: bool) -> Self {
        Self(value.to_string())
    }
}

macro_rules! impl_numeric {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for TopicValue {
                fn from(value: $ty) -> Self {
                    Self(value.to_string())
                }
            }

            impl PartialEq<$ty> for TopicValue {
                fn eq(&self, other: &$ty) -> bool {
                    self.comparable() == Comparable::Number(*other as f64)
                }
            }

            impl PartialOrd<$ty> for TopicValue {
                fn partial_cmp(&self, other: &$ty) -> Option<Ordering> {
                    Some(self.comparable().cmp(&Comparable::Number(*other as f64)))
                }
            }
        )*
    };
}

impl_numeric!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl PartialEq for TopicValue {
    fn eq(&self, other: &Self) -> bool {
        self.comparable() == other.comparable()
    }
}

impl Eq for TopicValue {}

impl PartialOrd for TopicValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TopicValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparable().cmp(&other.comparable())
    }
}

impl Hash for TopicValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.comparable().hash(state);
    }
}

impl PartialEq<str> for TopicValue {
    fn eq(&self, other: &str) -> bool {
        coerce::equivalent(&self.0, other)
    }
}

impl PartialEq<&str> for TopicValue {
    fn eq(&self, other: &&str) -> bool {
        coerce::equivalent(&self.0, other)
    }
}

impl PartialOrd<str> for TopicValue {
    fn partial_cmp(&self, other: &str) -> Option<Ordering> {
        Some(coerce::compare(&self.0, other))
    }
}

impl PartialOrd<&str> for TopicValue {
    fn partial_cmp(&self, other: &&str) -> Option<Ordering> {
        Some(coerce::compare(&self.0, other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::hash::BuildHasher;
    use std::collections::hash_map::RandomState;

    #[test]
    fn starts_unset() {
        let value = TopicValue::default();
        assert!(!value.is_set());
        assert_eq!(value.as_str(), NO_MESSAGE_RECEIVED);
        assert!(TopicValue::from("0").is_set());
    }

    #[test]
    fn literals_are_coerced_before_comparing() {
        let value = TopicValue::from("6");
        assert!(value == 6);
        assert!(value == 6.0_f64);
        assert!(value == "6.0");
        assert!(value != "six");
        assert!(value < 7);
        assert!(value >= 6u8);
        assert!(value < "ON");

        let text = TopicValue::from("ON");
        assert!(text == "ON");
        assert!(text != 0);
        assert!(text > 1_000_000);
    }

    #[test]
    fn six_and_six_point_zero_are_one_value() {
        let state = RandomState::new();
        let a = TopicValue::from("6");
        let b = TopicValue::from("6.0");
        assert_eq!(a, b);
        assert_eq!(state.hash_one(&a), state.hash_one(&b));

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn conversions_produce_wire_text() {
        assert_eq!(TopicValue::from(85).as_str(), "85");
        assert_eq!(TopicValue::from(-1.5).as_str(), "-1.5");
        assert_eq!(TopicValue::from(true).as_str(), "true");
        assert_eq!(TopicValue::from_payload(b"ON").as_str(), "ON");
        assert_eq!(TopicValue::from_payload(&[0x4f, 0xff]).as_str(), "O\u{fffd}");
    }
}
