//! # Bound Objects
//!
//! A [`BoundObject`] pairs an application value with the bindings declared for
//! it. Ordinary fields of the value are reached through `Deref`/`DerefMut`;
//! topic fields are reached by name through [`BoundObject::get`] and
//! [`BoundObject::set`], where `set` publishes instead of overwriting.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

use crate::binding::TopicBinding;
use crate::error::BindError;
use crate::runtime::TopicDeclaration;
use crate::transport::{Ack, PubSubTransport};
use crate::util::FieldName;
use crate::value::TopicValue;

/// Process-unique identity of a bound object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectId(u32);

static NEXT_OBJECT_ID: AtomicU32 = AtomicU32::new(1);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// The named bindings of one bound object, in declaration order.
///
/// Shared between the object (strong) and its bindings (weak), so a change
/// handler's queued writes can be resolved against the same fields.
pub struct FieldTable {
    pub(crate) owner: &'static str,
    pub(crate) id: ObjectId,
    pub(crate) bindings: Vec<Arc<TopicBinding>>,
}

impl FieldTable {
    /// Short type name of the owning object.
    pub fn owner_name(&self) -> &'static str {
        self.owner
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The binding attached under `field`.
    pub fn get(&self, field: &str) -> Option<&Arc<TopicBinding>> {
        self.bindings.iter().find(|binding| binding.field() == field)
    }

    /// The binding that follows `topic`.
    pub fn by_topic(&self, topic: &str) -> Option<&Arc<TopicBinding>> {
        self.bindings.iter().find(|binding| binding.topic() == topic)
    }

    /// All bindings, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TopicBinding>> {
        self.bindings.iter()
    }

    /// All field names, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|binding| binding.field())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Reads the field `field`, `None` if no topic is bound to it.
    pub fn read(&self, field: &str) -> Option<TopicValue> {
        self.get(field).map(|binding| binding.read())
    }

    /// Publishes `value` through the binding attached under `field`.
    ///
    /// This is the assignment path for topic fields: the binding is never
    /// replaced, its [`write`](TopicBinding::write) is called instead.
    pub async fn set<T>(
        &self,
        transport: &T,
        field: &str,
        value: impl Into<TopicValue>,
    ) -> Result<Ack, BindError>
    where
        T: PubSubTransport + ?Sized,
    {
        let Some(binding) = self.get(field) else {
            warn!("{} has no topic bound to field {}", self.owner, field);
            let mut name = FieldName::new();
            // Over-long names cannot have been bound, keep the prefix for the error.
            for c in field.chars() {
                if name.push(c).is_err() {
                    break;
                }
            }
            return Err(BindError::UnknownField { field: name });
        };
        binding.write(transport, value).await
    }
}

impl fmt::Debug for FieldTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.bindings
                    .iter()
                    .map(|binding| (binding.field(), binding.read())),
            )
            .finish()
    }
}

/// An application value whose declared topics are bound to named fields.
///
/// Created by [`Binder::bind`](crate::runtime::Binder::bind). Dropping it
/// drops its bindings; the registry forgets them on its own.
pub struct BoundObject<O> {
    target: O,
    fields: Arc<FieldTable>,
    declaration: TopicDeclaration,
}

impl<O> BoundObject<O> {
    pub(crate) fn new(target: O, fields: Arc<FieldTable>, declaration: TopicDeclaration) -> Self {
        Self {
            target,
            fields,
            declaration,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.fields.id
    }

    /// The declaration this object was bound with.
    pub fn declaration(&self) -> &TopicDeclaration {
        &self.declaration
    }

    /// The object's bindings.
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// The binding attached under `field`.
    pub fn binding(&self, field: &str) -> Option<&Arc<TopicBinding>> {
        self.fields.get(field)
    }

    /// The binding that follows `topic`.
    pub fn binding_for_topic(&self, topic: &str) -> Option<&Arc<TopicBinding>> {
        self.fields.by_topic(topic)
    }

    /// Reads a topic field.
    pub fn get(&self, field: &str) -> Option<TopicValue> {
        self.fields.read(field)
    }

    /// Assigns a topic field, which publishes `value` on its topic.
    ///
    /// Fails with [`BindError::UnknownField`] if no topic is bound to
    /// `field`, and otherwise with whatever [`TopicBinding::write`] returns.
    ///
    /// ```ignore
    /// watcher.set(&transport, "AIR_COND_SOUTH", "ON").await?;
    /// ```
    pub async fn set<T>(
        &self,
        transport: &T,
        field: &str,
        value: impl Into<TopicValue>,
    ) -> Result<Ack, BindError>
    where
        T: PubSubTransport + ?Sized,
    {
        self.fields.set(transport, field, value).await
    }

    /// The bound value itself.
    pub fn target(&self) -> &O {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut O {
        &mut self.target
    }

    /// Unbinds the object, returning the application value.
    pub fn into_inner(self) -> O {
        self.target
    }
}

impl<O> Deref for BoundObject<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.target
    }
}

impl<O> DerefMut for BoundObject<O> {
    fn deref_mut(&mut self) -> &mut O {
        &mut self.target
    }
}

impl<O> fmt::Display for BoundObject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fields.owner)
    }
}

impl<O> fmt::Debug for BoundObject<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.fields.owner)
            .field("subscriptions", &self.declaration.subscriptions())
            .field("publications", &self.declaration.publications())
            .field("fields", &*self.fields)
            .finish()
    }
}
