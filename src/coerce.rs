//! # Value Coercion
//!
//! Payloads travel as text. To let a binding compare against `85`, `72.5` or
//! `"ON"` alike, every comparison first runs both sides through
//! [`to_comparable`]: text that parses as a number compares numerically,
//! anything else compares as text. Equality, ordering and hashing are all
//! derived from this one rule, so `"6"` and `"6.0"` are equal and hash equal.

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

/// A payload as seen by comparisons: a number if it parses as one, otherwise
/// the original text.
#[derive(Debug, Clone, Copy)]
pub enum Comparable<'a> {
    Number(f64),
    Text(&'a str),
}

/// Parses `text` as a number, ignoring surrounding whitespace.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// Converts wire text into its comparable form.
///
/// ```
/// use myrtio_mqtt_binding::coerce::{to_comparable, Comparable};
///
/// assert!(matches!(to_comparable("12.5"), Comparable::Number(n) if n == 12.5));
/// assert!(matches!(to_comparable("ON"), Comparable::Text("ON")));
/// ```
pub fn to_comparable(text: &str) -> Comparable<'_> {
    match parse_number(text) {
        Some(n) => Comparable::Number(n),
        None => Comparable::Text(text),
    }
}

/// Compares two payloads under the coercion rule.
pub fn compare(a: &str, b: &str) -> Ordering {
    to_comparable(a).cmp(&to_comparable(b))
}

/// Returns `true` if two payloads are equal under the coercion rule.
pub fn equivalent(a: &str, b: &str) -> bool {
    to_comparable(a) == to_comparable(b)
}

// All NaNs collapse to one value and -0.0 to 0.0 so that equality, ordering
// and hashing agree.
fn canonical(n: f64) -> f64 {
    if n.is_nan() {
        f64::NAN
    } else if n == 0.0 {
        0.0
    } else {
        n
    }
}

impl Comparable<'_> {
    /// The numeric value, if the payload parsed as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Numbers order before text so that the order stays total when a numeric
/// and a non-numeric payload meet.
impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => canonical(*a).total_cmp(&canonical(*b)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl Hash for Comparable<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Number(n) => {
                0u8.hash(state);
                canonical(*n).to_bits().hash(state);
            }
            Self::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::hash::BuildHasher;
    use std::collections::hash_map::RandomState;

    #[test]
    fn numeric_iff_parseable() {
        assert_eq!(to_comparable("12.5").as_number(), Some(12.5));
        assert_eq!(to_comparable(" 42 ").as_number(), Some(42.0));
        assert_eq!(to_comparable("-3e2").as_number(), Some(-300.0));
        assert!(matches!(to_comparable("ON"), Comparable::Text("ON")));
        assert!(matches!(to_comparable(""), Comparable::Text("")));
        assert!(matches!(to_comparable("12.5.1"), Comparable::Text("12.5.1")));
    }

    #[test]
    fn numerically_equal_texts_are_equal_and_hash_equal() {
        let state = RandomState::new();
        let six = to_comparable("6");
        let six_point_zero = to_comparable("6.0");
        assert_eq!(six, six_point_zero);
        assert_eq!(state.hash_one(six), state.hash_one(six_point_zero));
        assert!(equivalent("-0", "0.0"));
        assert!(equivalent("NaN", "nan"));
    }

    #[test]
    fn text_and_numbers_never_compare_equal() {
        assert!(!equivalent("6", "six"));
        assert_eq!(compare("ON", "OFF"), Ordering::Greater);
    }

    #[test]
    fn ordering_is_numeric_not_lexicographic() {
        assert_eq!(compare("9", "10"), Ordering::Less);
        assert_eq!(compare("72", "72.0"), Ordering::Equal);
        assert_eq!(compare("100", "ON"), Ordering::Less);
        assert_eq!(compare("ON", "-1"), Ordering::Greater);
    }

    #[test]
    fn ordering_is_total_across_mixed_payloads() {
        let mut payloads = ["10", "ON", "9", "5x", "-1", "OFF", "9.0"];
        payloads.sort_by(|a, b| compare(a, b));
        assert_eq!(payloads, ["-1", "9", "9.0", "10", "5x", "OFF", "ON"]);
    }
}
