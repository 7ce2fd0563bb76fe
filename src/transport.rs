//! # Pub/Sub Transport Abstraction
//!
//! This module defines the `PubSubTransport` trait, the only way the binding
//! core talks to a broker. Any MQTT (or MQTT-like) client that can subscribe,
//! publish and report a result code per request satisfies it; connection
//! management, wire encoding and QoS delivery stay inside the client.
//!
//! With the Rust 2024 Edition, these traits use native `async fn`, removing the
//! need for the `#[async_trait]` macro.
//!
//! Inbound messages reach the core either by calling
//! [`Dispatcher::on_message`](crate::runtime::Dispatcher::on_message) directly
//! from the client's receive path, or by pushing [`InboundMessage`]s into an
//! [`InboundChannel`] drained by [`Dispatcher::run`](crate::runtime::Dispatcher::run).

use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::error::{ConnectionError, ResultCode};
use crate::util::TopicName;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// The transport's answer to a subscribe or publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ack {
    /// Whether the request was accepted.
    pub code: ResultCode,
    /// The message id the transport assigned to the request.
    pub message_id: u16,
}

impl Ack {
    /// An accepted request with the given message id.
    pub fn success(message_id: u16) -> Self {
        Self {
            code: ResultCode::Success,
            message_id,
        }
    }

    /// A rejected request.
    pub fn failure(code: ResultCode, message_id: u16) -> Self {
        Self { code, message_id }
    }

    /// Returns `true` if the request was accepted.
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// A trait representing a pub/sub client the bindings publish and subscribe
/// through.
///
/// Methods take `&self`: one transport is shared by every binding and by the
/// dispatcher, so implementations keep their mutable state behind their own
/// synchronisation (typically a channel to the task that owns the socket).
///
/// Both methods may suspend until the broker acknowledges the request. The
/// core never holds a lock across these calls and imposes no timeout of its
/// own.
#[allow(async_fn_in_trait)]
pub trait PubSubTransport {
    /// Requests a subscription to `topic`.
    async fn subscribe(&self, topic: &str, qos: QoS) -> Ack;

    /// Publishes `payload` to `topic`.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Ack;
}

impl<T: PubSubTransport + ?Sized> PubSubTransport for &T {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Ack {
        (**self).subscribe(topic, qos).await
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Ack {
        (**self).publish(topic, payload, qos, retain).await
    }
}

/// A transport that can open a connection to a broker.
#[allow(async_fn_in_trait)]
pub trait BrokerConnector {
    /// Connects to the broker at `host:port`.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectionError>;
}

/// A message received from the broker, owned so it can cross a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The topic the message was published on.
    pub topic: TopicName,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Creates an inbound message. Returns `None` if the topic does not fit
    /// in a [`TopicName`].
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        let topic = crate::util::topic_name(topic).ok()?;
        Some(Self {
            topic,
            payload: payload.to_vec(),
        })
    }
}

pub type InboundChannel<const DEPTH: usize> =
    Channel<CriticalSectionRawMutex, InboundMessage, DEPTH>;

pub type InboundSender<'a, const DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, InboundMessage, DEPTH>;

pub type InboundReceiver<'a, const DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, InboundMessage, DEPTH>;
