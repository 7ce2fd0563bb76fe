//! # Error Types
//!
//! This module defines the error types returned by binding, writing and
//! dispatching. Every failure is returned as a value; the logging macros are a
//! separate diagnostic channel and never replace the returned error.

use alloc::string::String;
use core::fmt;

use crate::util::{FieldName, TopicName};

/// The result code reported by the transport for a subscribe or publish.
///
/// The numbering follows the usual MQTT client convention where `0` means the
/// request was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResultCode {
    /// The request was accepted.
    Success,
    /// The client ran out of memory for the request.
    NoMemory,
    /// A protocol violation was detected.
    Protocol,
    /// The request arguments were invalid.
    InvalidArgument,
    /// The client is not connected to a broker.
    NoConnection,
    /// The broker refused the request.
    Refused,
    /// The outgoing queue is full.
    QueueFull,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ResultCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::NoMemory,
            2 => Self::Protocol,
            3 => Self::InvalidArgument,
            4 => Self::NoConnection,
            5 => Self::Refused,
            15 => Self::QueueFull,
            _ => Self::Other(val),
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Success => 0,
            ResultCode::NoMemory => 1,
            ResultCode::Protocol => 2,
            ResultCode::InvalidArgument => 3,
            ResultCode::NoConnection => 4,
            ResultCode::Refused => 5,
            ResultCode::QueueFull => 15,
            ResultCode::Other(val) => val,
        }
    }
}

impl ResultCode {
    /// Returns `true` for [`ResultCode::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Why a topic could not be turned into a field identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidTopicReason {
    /// The topic is the empty string.
    Empty,
    /// The topic does not fit in [`MAX_TOPIC_LEN`](crate::util::MAX_TOPIC_LEN).
    TooLong,
    /// The derived field would start with a digit.
    StartsWithDigit,
    /// The topic contains a character that is not allowed in an identifier.
    InvalidCharacter(char),
    /// Another declared topic already derives the same field name.
    FieldCollision,
}

impl fmt::Display for InvalidTopicReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("topic is empty"),
            Self::TooLong => f.write_str("topic is too long"),
            Self::StartsWithDigit => f.write_str("field name would start with a digit"),
            Self::InvalidCharacter(c) => write!(f, "character {c:?} is not valid in a field name"),
            Self::FieldCollision => f.write_str("field name is already used by another topic"),
        }
    }
}

/// Error returned by a change handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    /// Creates a handler error with a human readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason given by the handler.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl core::error::Error for HandlerError {}

/// The primary error enum for binding, writing and dispatching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The topic cannot be attached as a field. Only that topic is skipped.
    InvalidTopicName {
        topic: String,
        reason: InvalidTopicReason,
    },
    /// A write was attempted on a binding that was not declared for publishing.
    PermissionDenied { topic: TopicName },
    /// The transport did not accept a publish. The local value is unchanged.
    PublishFailed {
        topic: TopicName,
        code: ResultCode,
        message_id: u16,
    },
    /// The transport did not accept a subscribe. The topic has no registry entry.
    SubscribeFailed {
        topic: TopicName,
        code: ResultCode,
        message_id: u16,
    },
    /// A change handler failed while a message was being dispatched.
    HandlerFailure {
        topic: TopicName,
        owner: &'static str,
        error: HandlerError,
    },
    /// A change handler requested more writes than its outbox holds. The
    /// writes beyond the capacity were not performed.
    OutboxFull {
        topic: TopicName,
        owner: &'static str,
        dropped: usize,
    },
    /// No binding is attached under the given field name.
    UnknownField { field: FieldName },
}

impl BindError {
    /// The topic the error relates to, if any.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::InvalidTopicName { topic, .. } => Some(topic.as_str()),
            Self::PermissionDenied { topic }
            | Self::PublishFailed { topic, .. }
            | Self::SubscribeFailed { topic, .. }
            | Self::HandlerFailure { topic, .. }
            | Self::OutboxFull { topic, .. } => Some(topic.as_str()),
            Self::UnknownField { .. } => None,
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopicName { topic, reason } => {
                write!(f, "topic {topic:?} cannot be bound: {reason}")
            }
            Self::PermissionDenied { topic } => {
                write!(f, "no permission to publish to topic {topic}")
            }
            Self::PublishFailed {
                topic,
                code,
                message_id,
            } => write!(
                f,
                "publish of message {message_id} to {topic} failed with {code:?}"
            ),
            Self::SubscribeFailed {
                topic,
                code,
                message_id,
            } => write!(
                f,
                "could not subscribe to {topic} (message {message_id}): {code:?}"
            ),
            Self::HandlerFailure {
                topic,
                owner,
                error,
            } => write!(f, "change handler of {owner} for {topic} failed: {error}"),
            Self::OutboxFull {
                topic,
                owner,
                dropped,
            } => write!(
                f,
                "change handler of {owner} for {topic} requested {dropped} writes more than its outbox holds"
            ),
            Self::UnknownField { field } => write!(f, "no topic is bound to field {field}"),
        }
    }
}

impl core::error::Error for BindError {}

/// The transport could not establish a connection to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// The broker address could not be resolved or reached.
    Unreachable,
    /// The broker refused the connection. The enclosed code is the broker's.
    Refused(u8),
    /// The connection attempt timed out inside the transport.
    Timeout,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => f.write_str("broker unreachable"),
            Self::Refused(code) => write!(f, "connection refused by broker (code {code})"),
            Self::Timeout => f.write_str("connection timed out"),
        }
    }
}

impl core::error::Error for ConnectionError {}
