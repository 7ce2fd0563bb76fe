//! # In-Memory Loopback Broker
//!
//! [`LoopbackBroker`] implements [`PubSubTransport`] without a network. It
//! acknowledges every request unless told to fail it, records what was
//! published and echoes every publish on a subscribed topic back into its
//! inbound channel, the way a broker delivers a client's own messages.
//!
//! It is meant for host tests and demos:
//!
//! ```
//! use embassy_futures::block_on;
//! use myrtio_mqtt_binding::loopback::LoopbackBroker;
//! use myrtio_mqtt_binding::runtime::{Binder, Dispatcher, SubscriberRegistry, TopicDeclaration};
//!
//! struct Sensor;
//! impl myrtio_mqtt_binding::runtime::BindTarget for Sensor {}
//!
//! let broker = LoopbackBroker::<8>::new();
//! let registry = SubscriberRegistry::new();
//! let sensor = block_on(Binder::new(&broker, &registry).bind(
//!     Sensor,
//!     TopicDeclaration::new().subscribe("TEMPERATURE").publish("TEMPERATURE"),
//! ))
//! .into_object();
//!
//! block_on(sensor.set(&broker, "TEMPERATURE", 85)).unwrap();
//! let dispatcher = Dispatcher::new(&broker, &registry);
//! assert_eq!(block_on(broker.pump(&dispatcher)), 1);
//! assert_eq!(sensor.get("TEMPERATURE").unwrap(), "85");
//! ```

use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::error::{ConnectionError, ResultCode};
use crate::runtime::Dispatcher;
use crate::transport::{Ack, BrokerConnector, InboundChannel, InboundMessage, PubSubTransport, QoS};

/// Default depth of the loopback inbound channel.
pub const DEFAULT_LOOPBACK_DEPTH: usize = 16;

/// A publish accepted by the loopback broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub message_id: u16,
}

#[derive(Default)]
struct LoopbackState {
    subscriptions: Vec<String>,
    published: Vec<PublishRecord>,
    failing_subscribes: Vec<(String, ResultCode)>,
    failing_publishes: Vec<(String, ResultCode)>,
    last_message_id: u16,
    connected_to: Option<(String, u16)>,
}

impl LoopbackState {
    fn next_message_id(&mut self) -> u16 {
        self.last_message_id = self.last_message_id.wrapping_add(1);
        if self.last_message_id == 0 {
            self.last_message_id = 1;
        }
        self.last_message_id
    }
}

fn failure_for(failures: &[(String, ResultCode)], topic: &str) -> Option<ResultCode> {
    failures
        .iter()
        .find(|(failing, _)| failing == topic)
        .map(|(_, code)| *code)
}

/// A broker that lives in memory and loops publishes back to subscribers.
///
/// # Type Parameters
///
/// - `DEPTH`: Capacity of the inbound channel. Echoes that do not fit are
///   dropped with a warning.
pub struct LoopbackBroker<const DEPTH: usize = DEFAULT_LOOPBACK_DEPTH> {
    state: Mutex<CriticalSectionRawMutex, RefCell<LoopbackState>>,
    inbox: InboundChannel<DEPTH>,
}

impl<const DEPTH: usize> LoopbackBroker<DEPTH> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(LoopbackState::default())),
            inbox: InboundChannel::new(),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LoopbackState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Makes every later subscribe to `topic` fail with `code`.
    pub fn fail_subscribe(&self, topic: &str, code: ResultCode) {
        self.with_state(|state| state.failing_subscribes.push((String::from(topic), code)));
    }

    /// Makes every later publish to `topic` fail with `code`.
    pub fn fail_publish(&self, topic: &str, code: ResultCode) {
        self.with_state(|state| state.failing_publishes.push((String::from(topic), code)));
    }

    /// Accepts every request again.
    pub fn clear_failures(&self) {
        self.with_state(|state| {
            state.failing_subscribes.clear();
            state.failing_publishes.clear();
        });
    }

    /// Every accepted publish, oldest first.
    pub fn published(&self) -> Vec<PublishRecord> {
        self.with_state(|state| state.published.clone())
    }

    /// Topics with an accepted subscription, in the order they were
    /// subscribed.
    pub fn subscriptions(&self) -> Vec<String> {
        self.with_state(|state| state.subscriptions.clone())
    }

    /// The `(host, port)` of the last successful [`connect`](BrokerConnector::connect).
    pub fn connected_to(&self) -> Option<(String, u16)> {
        self.with_state(|state| state.connected_to.clone())
    }

    /// Injects a message as if another client had published it.
    ///
    /// Returns `false` if the inbound channel is full or the topic is too
    /// long.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(message) = InboundMessage::new(topic, payload) else {
            warn!("cannot deliver to {}: topic too long", topic);
            return false;
        };
        if self.inbox.try_send(message).is_err() {
            warn!("inbound channel full, dropping message on {}", topic);
            return false;
        }
        true
    }

    /// The inbound channel, for feeding [`Dispatcher::run`].
    pub fn inbox(&self) -> &InboundChannel<DEPTH> {
        &self.inbox
    }

    /// Number of inbound messages waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Dispatches inbound messages until the channel is empty, including the
    /// echoes of publishes made while dispatching.
    ///
    /// Returns the number of messages dispatched.
    pub async fn pump(&self, dispatcher: &Dispatcher<'_, Self>) -> usize {
        let mut dispatched = 0;
        while let Ok(message) = self.inbox.try_receive() {
            dispatcher.on_message(&message.topic, &message.payload).await;
            dispatched += 1;
        }
        dispatched
    }
}

impl<const DEPTH: usize> Default for LoopbackBroker<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: usize> PubSubTransport for LoopbackBroker<DEPTH> {
    async fn subscribe(&self, topic: &str, _qos: QoS) -> Ack {
        self.with_state(|state| {
            let message_id = state.next_message_id();
            if let Some(code) = failure_for(&state.failing_subscribes, topic) {
                return Ack::failure(code, message_id);
            }
            if !state.subscriptions.iter().any(|t| t == topic) {
                state.subscriptions.push(String::from(topic));
            }
            trace!("loopback subscribed to {}", topic);
            Ack::success(message_id)
        })
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Ack {
        let (ack, echo) = self.with_state(|state| {
            let message_id = state.next_message_id();
            if let Some(code) = failure_for(&state.failing_publishes, topic) {
                return (Ack::failure(code, message_id), false);
            }
            state.published.push(PublishRecord {
                topic: String::from(topic),
                payload: payload.to_vec(),
                qos,
                retain,
                message_id,
            });
            let echo = state.subscriptions.iter().any(|t| t == topic);
            (Ack::success(message_id), echo)
        });

        if echo {
            self.deliver(topic, payload);
        }
        ack
    }
}

impl<const DEPTH: usize> BrokerConnector for LoopbackBroker<DEPTH> {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectionError> {
        if host.is_empty() || port == 0 {
            return Err(ConnectionError::Unreachable);
        }
        info!("loopback connected as {}:{}", host, port);
        self.with_state(|state| state.connected_to = Some((String::from(host), port)));
        Ok(())
    }
}
