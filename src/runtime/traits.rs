//! Capability traits for bound objects and change handlers.
//!
//! # Publishing Pattern
//!
//! Change handlers never perform async I/O directly. Instead, they use the
//! `PublishOutbox` trait to queue writes to fields of their owner. The
//! dispatcher performs the actual async publishing after every registrant of
//! the message has been updated, with no registry or binding lock held.
//!
//! This keeps handlers plain synchronous closures while a write may still
//! wait on the transport's acknowledgement.

use crate::object::FieldTable;
use crate::value::TopicValue;

/// Object-safe trait for queuing writes from a change handler.
///
/// # Example
///
/// ```ignore
/// temperature.set_on_change(move |binding, outbox| {
///     let command = if binding.read() > 72 { "ON" } else { "OFF" };
///     outbox.set("AIR_COND_SOUTH", command.into());
///     Ok(())
/// });
/// ```
pub trait PublishOutbox {
    /// Queue a write of `value` to the field `field` of the handler's owner.
    ///
    /// This is synchronous and returns immediately. The write happens as if
    /// the application called
    /// [`BoundObject::set`](crate::object::BoundObject::set) once the
    /// handler returned.
    fn set(&mut self, field: &str, value: TopicValue);
}

/// Optional post-bind extension point.
///
/// Bindings do not exist while the target is being constructed, so this is
/// the place to install change handlers. The binder calls
/// [`on_bound`](PostBindHook::on_bound) once, after every declared topic has
/// been attached.
///
/// # Example
///
/// ```ignore
/// impl PostBindHook for TemperatureWatcher {
///     fn on_bound(&mut self, fields: &FieldTable) {
///         let hold = self.hold_temp;
///         if let Some(temperature) = fields.get("TEMPERATURE") {
///             temperature.set_on_change(move |binding, outbox| {
///                 let command = if binding.read() > hold { "ON" } else { "OFF" };
///                 outbox.set("AIR_COND_SOUTH", command.into());
///                 Ok(())
///             });
///         }
///     }
/// }
/// ```
pub trait PostBindHook {
    /// Called once with the completed field table of the new object.
    fn on_bound(&mut self, fields: &FieldTable);
}

/// A value that can be bound to topics.
///
/// The only method exposes the optional [`PostBindHook`] capability. Types
/// without a hook implement this trait with an empty body.
pub trait BindTarget {
    /// Returns the post-bind hook, if the type has one.
    ///
    /// The default implementation returns `None`.
    fn post_bind_hook(&mut self) -> Option<&mut dyn PostBindHook> {
        None
    }
}

impl BindTarget for () {}

/// Blanket implementation for mutable references.
///
/// This allows binding a borrowed target, the hook then runs on the original.
impl<B: BindTarget + ?Sized> BindTarget for &mut B {
    fn post_bind_hook(&mut self) -> Option<&mut dyn PostBindHook> {
        (**self).post_bind_hook()
    }
}
