//! Inbound message routing.

use alloc::sync::Arc;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use futures::future::{Either, select};

use crate::binding::TopicBinding;
use crate::error::BindError;
use crate::transport::{InboundReceiver, PubSubTransport};
use crate::value::TopicValue;

use super::publisher::{BufferedOutbox, DEFAULT_OUTBOX_CAPACITY, PendingWrite};
use super::registry::SubscriberRegistry;

/// What happened to one inbound message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Registrants whose value was updated.
    pub delivered: usize,
    /// Writes requested by change handlers that were published.
    pub published: usize,
    /// Failed handlers and failed handler writes, in the order they happened.
    pub failures: Vec<BindError>,
}

impl DispatchReport {
    /// Returns `true` if nobody was registered for the topic.
    pub fn is_unrouted(&self) -> bool {
        self.delivered == 0
    }

    /// Returns `true` if every handler and every requested write succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Routes inbound messages to the bindings registered for their topic.
///
/// Deliveries are serialised: every registrant of a message has received it
/// before the next message is looked at. The writes handlers requested are
/// published afterwards, outside the delivery lock, so they may overlap with
/// the delivery of a later message.
pub struct Dispatcher<'a, T> {
    transport: &'a T,
    registry: &'a SubscriberRegistry,
    serial: Mutex<CriticalSectionRawMutex, ()>,
}

impl<'a, T: PubSubTransport> Dispatcher<'a, T> {
    pub fn new(transport: &'a T, registry: &'a SubscriberRegistry) -> Self {
        Self {
            transport,
            registry,
            serial: Mutex::new(()),
        }
    }

    /// Delivers one message.
    ///
    /// Every live registrant of `topic` receives the payload, in registration
    /// order. A failing change handler is reported and delivery continues
    /// with the next registrant. Once all of them have received, the writes
    /// their handlers queued are published in the order they were queued.
    ///
    /// Payloads that are not valid UTF-8 are decoded lossily.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) -> DispatchReport {
        let mut report = DispatchReport::default();
        let queued = self.deliver(topic, payload, &mut report).await;

        // The delivery lock is released here, so a transport can keep
        // dispatching while a publish below waits for its acknowledgement.
        for (binding, write) in queued {
            let Some(fields) = binding.owner() else {
                debug!(
                    "dropping write to {}: {} no longer exists",
                    write.field.as_str(),
                    binding.owner_name()
                );
                continue;
            };

            match fields.set(self.transport, &write.field, write.value).await {
                Ok(_) => report.published += 1,
                Err(err) => {
                    warn!(
                        "write to {}.{} requested by a change handler failed",
                        binding.owner_name(),
                        write.field.as_str()
                    );
                    report.failures.push(err);
                }
            }
        }

        debug!(
            "dispatched {} to {} subscribers, {} writes, {} failures",
            topic,
            report.delivered,
            report.published,
            report.failures.len()
        );
        report
    }

    /// Hands the payload to every registrant of `topic` under the delivery
    /// lock and collects the writes their handlers queued.
    async fn deliver(
        &self,
        topic: &str,
        payload: &[u8],
        report: &mut DispatchReport,
    ) -> Vec<(Arc<TopicBinding>, PendingWrite)> {
        let _serial = self.serial.lock().await;

        let registrants = self.registry.registrants(topic);
        if registrants.is_empty() {
            trace!("no subscribers for {}", topic);
            return Vec::new();
        }

        let value = TopicValue::from_payload(payload);
        let mut queued: Vec<(Arc<TopicBinding>, PendingWrite)> = Vec::new();

        for binding in &registrants {
            let mut outbox = BufferedOutbox::<DEFAULT_OUTBOX_CAPACITY>::new();
            if let Err(error) = binding.receive(value.clone(), &mut outbox) {
                error!(
                    "change handler of {}.{} failed: {}",
                    binding.owner_name(),
                    binding.field(),
                    error.reason()
                );
                report.failures.push(BindError::HandlerFailure {
                    topic: binding.topic_name().clone(),
                    owner: binding.owner_name(),
                    error,
                });
            }
            report.delivered += 1;

            let dropped = outbox.dropped();
            if dropped > 0 {
                error!(
                    "change handler of {}.{} lost {} writes",
                    binding.owner_name(),
                    binding.field(),
                    dropped
                );
                report.failures.push(BindError::OutboxFull {
                    topic: binding.topic_name().clone(),
                    owner: binding.owner_name(),
                    dropped,
                });
            }
            queued.extend(outbox.drain().map(|write| (Arc::clone(binding), write)));
        }
        queued
    }

    /// Dispatches every message received on `receiver`, forever.
    pub async fn run<const DEPTH: usize>(&self, receiver: InboundReceiver<'_, DEPTH>) -> ! {
        loop {
            let message = receiver.receive().await;
            self.on_message(&message.topic, &message.payload).await;
        }
    }

    /// Dispatches messages received on `receiver` until `stop` is signaled.
    ///
    /// A message being dispatched when the signal arrives is finished first.
    /// Returns the number of messages dispatched.
    pub async fn run_until<const DEPTH: usize>(
        &self,
        receiver: InboundReceiver<'_, DEPTH>,
        stop: &Signal<CriticalSectionRawMutex, ()>,
    ) -> usize {
        let mut dispatched = 0;
        loop {
            let next = receiver.receive();
            let stopped = stop.wait();
            match select(core::pin::pin!(next), core::pin::pin!(stopped)).await {
                Either::Left((message, _)) => {
                    self.on_message(&message.topic, &message.payload).await;
                    dispatched += 1;
                }
                Either::Right(((), _)) => {
                    info!("dispatcher stopped after {} messages", dispatched);
                    return dispatched;
                }
            }
        }
    }
}
