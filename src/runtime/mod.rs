//! Binding Runtime
//!
//! Connects bound objects to the transport.
//!
//! # Overview
//!
//! - [`Binder`] turns a [`TopicDeclaration`] into bindings on a new object,
//!   subscribing through the transport and filing subscribed bindings in the
//!   [`SubscriberRegistry`].
//! - [`Dispatcher`] takes inbound messages and hands each one to every
//!   binding registered for its topic.
//! - [`PostBindHook`] is where an object installs its change handlers once
//!   its bindings exist.
//!
//! # Publishing Pattern
//!
//! Change handlers never perform async I/O directly. They queue writes through
//! a [`PublishOutbox`], and the dispatcher publishes them once every registrant
//! of the message has received it.
//!
//! # Example
//!
//! See `demos/temperature_watcher.rs` for a complete object bound to a
//! loopback broker.

pub(crate) mod binder;
pub(crate) mod dispatcher;
pub(crate) mod publisher;
pub(crate) mod registry;
pub(crate) mod traits;

pub use binder::{BindOptions, BindOutcome, Binder, TopicDeclaration};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use publisher::{BufferedOutbox, DEFAULT_OUTBOX_CAPACITY, PendingWrite};
pub use registry::SubscriberRegistry;
pub use traits::{BindTarget, PostBindHook, PublishOutbox};
