//! # Topic-Bound Objects for Embedded Pub/Sub
//!
//! `myrtio-mqtt-binding` lets an application declare which MQTT topics an
//! object follows and which it may publish to, then exposes each topic as a
//! named field on that object. Incoming messages update the field and run a
//! change handler; assigning the field publishes.
//!
//! ## Core Features
//!
//! - **`no_std`:** Runs on bare-metal targets with an allocator. Topic and
//!   field names are bounded `heapless` strings.
//! - **Fully Async:** Subscribing and publishing await the transport, built on
//!   the [Embassy](https://embassy.dev/) synchronisation primitives.
//! - **Rust 2024 Edition:** Uses native `async fn` in traits, removing the need
//!   for `async-trait`.
//! - **Transport Agnostic:** Any client implementing [`PubSubTransport`] can
//!   carry the bindings. An in-memory [`LoopbackBroker`] is included for tests.
//! - **Value Coercion:** Topic values compare numerically when both sides parse
//!   as numbers and as text otherwise, so `"6"` equals `"6.0"`.
//!
//! ## Architecture
//!
//! ```ignore
//! use myrtio_mqtt_binding::object::FieldTable;
//! use myrtio_mqtt_binding::runtime::{
//!     BindTarget, Binder, Dispatcher, PostBindHook, SubscriberRegistry, TopicDeclaration,
//! };
//!
//! static REGISTRY: SubscriberRegistry = SubscriberRegistry::new();
//!
//! struct TemperatureWatcher {
//!     hold_temp: i32,
//! }
//!
//! impl PostBindHook for TemperatureWatcher {
//!     fn on_bound(&mut self, fields: &FieldTable) {
//!         let hold = self.hold_temp;
//!         if let Some(temperature) = fields.get("TEMPERATURE") {
//!             temperature.set_on_change(move |binding, outbox| {
//!                 let command = if binding.read() > hold { "ON" } else { "OFF" };
//!                 outbox.set("AIR_COND_SOUTH", command.into());
//!                 Ok(())
//!             });
//!         }
//!     }
//! }
//!
//! let watcher = Binder::new(&transport, &REGISTRY)
//!     .bind(
//!         TemperatureWatcher { hold_temp: 72 },
//!         TopicDeclaration::new()
//!             .subscribe("TEMPERATURE")
//!             .publish_all(["TEMPERATURE", "AIR_COND/SOUTH"]),
//!     )
//!     .await
//!     .into_object();
//!
//! // Inbound messages from the client's receive loop.
//! let dispatcher = Dispatcher::new(&transport, &REGISTRY);
//! dispatcher.on_message(topic, payload).await;
//!
//! // Assignment publishes.
//! watcher.set(&transport, "TEMPERATURE", 85).await?;
//! ```
//!
//! ## Ownership Model
//!
//! A [`BoundObject`] owns its bindings. The registry only holds weak
//! references, so dropping the object is enough to stop routing messages to
//! it; there is no explicit deregistration and nothing is unsubscribed at the
//! broker.
//!
//! ## Logging
//!
//! Diagnostics go to `log` or `defmt`, selected with the feature of the same
//! name. Without either feature they compile away.

#![no_std]

#[cfg(test)]
extern crate std;

extern crate alloc;

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod binding;
pub mod coerce;
pub mod error;
pub mod loopback;
pub mod object;
pub mod runtime;
pub mod transport;
pub mod util;
pub mod value;

// Re-export key types for easier access at the crate root.
pub use binding::{TopicAccess, TopicBinding};
pub use error::{BindError, HandlerError, ResultCode};
pub use loopback::LoopbackBroker;
pub use object::{BoundObject, FieldTable, ObjectId};
pub use runtime::{Binder, Dispatcher, SubscriberRegistry, TopicDeclaration};
pub use transport::{Ack, PubSubTransport, QoS};
pub use value::TopicValue;
