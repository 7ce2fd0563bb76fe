//! # Topic Name Utilities
//!
//! Bounded topic strings and the topic -> field identifier derivation used to
//! attach a binding under a name on its owning object.

use crate::error::InvalidTopicReason;

/// Maximum length for a single topic string (and therefore a field name).
pub const MAX_TOPIC_LEN: usize = 128;

/// Separator between topic hierarchy levels.
pub const TOPIC_SEPARATOR: char = '/';

/// Identifier-safe replacement for [`TOPIC_SEPARATOR`] in field names.
pub const FIELD_SEPARATOR: char = '_';

/// An owned, bounded topic name.
pub type TopicName = heapless::String<MAX_TOPIC_LEN>;

/// An owned, bounded field identifier derived from a topic.
pub type FieldName = heapless::String<MAX_TOPIC_LEN>;

/// Copies `topic` into a bounded [`TopicName`].
pub fn topic_name(topic: &str) -> Result<TopicName, InvalidTopicReason> {
    if topic.is_empty() {
        return Err(InvalidTopicReason::Empty);
    }
    let mut owned = TopicName::new();
    owned
        .push_str(topic)
        .map_err(|_| InvalidTopicReason::TooLong)?;
    Ok(owned)
}

/// Derives the field identifier a topic is attached under.
///
/// Every `/` is replaced with `_`; the result must then be a valid
/// identifier: a letter or `_` followed by letters, digits or `_`. MQTT
/// wildcards (`+`, `#`) and any other punctuation are rejected.
///
/// ```
/// use myrtio_mqtt_binding::util::field_name;
///
/// assert_eq!(field_name("AIR_COND/SOUTH").unwrap().as_str(), "AIR_COND_SOUTH");
/// assert!(field_name("sensors/+/temp").is_err());
/// ```
pub fn field_name(topic: &str) -> Result<FieldName, InvalidTopicReason> {
    if topic.is_empty() {
        return Err(InvalidTopicReason::Empty);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(InvalidTopicReason::TooLong);
    }

    let mut field = FieldName::new();
    for (i, c) in topic.chars().enumerate() {
        let c = if c == TOPIC_SEPARATOR { FIELD_SEPARATOR } else { c };
        if i == 0 && c.is_numeric() {
            return Err(InvalidTopicReason::StartsWithDigit);
        }
        if !(c.is_alphanumeric() || c == FIELD_SEPARATOR) {
            return Err(InvalidTopicReason::InvalidCharacter(c));
        }
        field.push(c).map_err(|_| InvalidTopicReason::TooLong)?;
    }
    Ok(field)
}

/// Returns `true` if `topic` can be bound to a field.
pub fn is_bindable(topic: &str) -> bool {
    field_name(topic).is_ok()
}
