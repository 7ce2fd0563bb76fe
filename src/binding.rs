//! # Topic Bindings
//!
//! A [`TopicBinding`] is the live cell behind one bound field: the topic's
//! last known value, what the owner may do with the topic, when it last
//! changed and the handler to run when a message arrives.
//!
//! Bindings are created by the [`Binder`](crate::runtime::Binder) and shared
//! through `Arc`; the owning object holds the strong references, the registry
//! only weak ones.

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;

use crate::error::{BindError, HandlerError};
use crate::object::{FieldTable, ObjectId};
use crate::runtime::PublishOutbox;
use crate::transport::{Ack, PubSubTransport, QoS};
use crate::util::{FieldName, TopicName};
use crate::value::TopicValue;

/// Handler run after every inbound update of a binding.
///
/// It receives the updated binding and an outbox through which it can request
/// writes to fields of the same owner. Returning an error marks the delivery
/// as failed for this registrant only.
pub type ChangeHandler =
    Box<dyn FnMut(&TopicBinding, &mut dyn PublishOutbox) -> Result<(), HandlerError> + Send>;

/// What the owning object may do with a topic.
///
/// There is deliberately no variant for "neither".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicAccess {
    /// Receives messages, may not publish.
    Subscribe,
    /// May publish, never receives messages.
    Publish,
    /// Receives messages and may publish.
    Both,
}

impl TopicAccess {
    /// Builds the access from the two permission flags. Returns `None` if
    /// neither is set.
    pub fn from_flags(is_subscribed: bool, can_publish: bool) -> Option<Self> {
        match (is_subscribed, can_publish) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Subscribe),
            (false, true) => Some(Self::Publish),
            (false, false) => None,
        }
    }

    /// Adds publish permission.
    pub fn with_publish(self) -> Self {
        match self {
            Self::Subscribe | Self::Both => Self::Both,
            Self::Publish => Self::Publish,
        }
    }

    pub fn is_subscribed(self) -> bool {
        matches!(self, Self::Subscribe | Self::Both)
    }

    pub fn can_publish(self) -> bool {
        matches!(self, Self::Publish | Self::Both)
    }
}

/// Weak back-reference from a binding to the object it belongs to.
#[derive(Clone)]
pub(crate) struct OwnerRef {
    pub(crate) type_name: &'static str,
    pub(crate) id: ObjectId,
    pub(crate) table: Weak<FieldTable>,
}

impl OwnerRef {
    #[cfg(test)]
    pub(crate) fn detached(type_name: &'static str) -> Self {
        Self {
            type_name,
            id: ObjectId::next(),
            table: Weak::new(),
        }
    }
}

struct BindingState {
    value: TopicValue,
    last_message_time: Option<Instant>,
    last_publish_time: Option<Instant>,
}

enum HandlerSlot {
    Vacant,
    Installed(ChangeHandler),
    // Taken out while it runs.
    Running,
}

/// The live state of one topic as seen by one owning object.
pub struct TopicBinding {
    topic: TopicName,
    field: FieldName,
    access: TopicAccess,
    qos: QoS,
    retain: bool,
    owner: OwnerRef,
    state: Mutex<CriticalSectionRawMutex, RefCell<BindingState>>,
    on_change: Mutex<CriticalSectionRawMutex, RefCell<HandlerSlot>>,
}

impl TopicBinding {
    pub(crate) fn new(
        topic: TopicName,
        field: FieldName,
        access: TopicAccess,
        qos: QoS,
        retain: bool,
        owner: OwnerRef,
    ) -> Self {
        Self {
            topic,
            field,
            access,
            qos,
            retain,
            owner,
            state: Mutex::new(RefCell::new(BindingState {
                value: TopicValue::unset(),
                last_message_time: None,
                last_publish_time: None,
            })),
            on_change: Mutex::new(RefCell::new(HandlerSlot::Vacant)),
        }
    }

    /// The topic this binding follows. Never changes.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn topic_name(&self) -> &TopicName {
        &self.topic
    }

    /// The field name the binding is attached under on its owner.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn access(&self) -> TopicAccess {
        self.access
    }

    pub fn can_publish(&self) -> bool {
        self.access.can_publish()
    }

    pub fn is_subscribed(&self) -> bool {
        self.access.is_subscribed()
    }

    /// Short type name of the owning object.
    pub fn owner_name(&self) -> &'static str {
        self.owner.type_name
    }

    pub fn owner_id(&self) -> ObjectId {
        self.owner.id
    }

    /// The owner's field table, if the owner is still alive.
    pub fn owner(&self) -> Option<Arc<FieldTable>> {
        self.owner.table.upgrade()
    }

    /// Returns the current value.
    pub fn read(&self) -> TopicValue {
        self.state.lock(|state| state.borrow().value.clone())
    }

    /// When the last inbound message was applied, `None` before the first.
    pub fn last_message_time(&self) -> Option<Instant> {
        self.state.lock(|state| state.borrow().last_message_time)
    }

    /// When the last successful publish happened, `None` before the first.
    pub fn last_publish_time(&self) -> Option<Instant> {
        self.state.lock(|state| state.borrow().last_publish_time)
    }

    /// Publishes `payload` and, once the transport accepted it, makes it the
    /// binding's value.
    ///
    /// A binding that was not declared for publishing refuses the write with
    /// [`BindError::PermissionDenied`] without calling the transport. A
    /// rejected publish returns [`BindError::PublishFailed`]. In both cases
    /// the value is left unchanged.
    pub async fn write<T>(
        &self,
        transport: &T,
        payload: impl Into<TopicValue>,
    ) -> Result<Ack, BindError>
    where
        T: PubSubTransport + ?Sized,
    {
        let payload = payload.into();

        if !self.can_publish() {
            warn!(
                "{}.{} does not have permission to publish to topic {}",
                self.owner.type_name,
                self.field.as_str(),
                self.topic.as_str()
            );
            return Err(BindError::PermissionDenied {
                topic: self.topic.clone(),
            });
        }

        let ack = transport
            .publish(&self.topic, payload.as_bytes(), self.qos, self.retain)
            .await;

        if !ack.is_success() {
            warn!(
                "publish message {} failed with code {}, tried to publish {} to {}",
                ack.message_id,
                u8::from(ack.code),
                payload.as_str(),
                self.topic.as_str()
            );
            return Err(BindError::PublishFailed {
                topic: self.topic.clone(),
                code: ack.code,
                message_id: ack.message_id,
            });
        }

        let now = Instant::now();
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.value = payload;
            state.last_publish_time = Some(now);
        });
        trace!("published to {} (message {})", self.topic.as_str(), ack.message_id);
        Ok(ack)
    }

    /// Applies an inbound message and runs the change handler.
    ///
    /// The handler runs with no lock held. Without a handler a warning is
    /// logged and the update still counts as delivered.
    pub(crate) fn receive(
        &self,
        payload: TopicValue,
        outbox: &mut dyn PublishOutbox,
    ) -> Result<(), HandlerError> {
        let now = Instant::now();
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.value = payload;
            state.last_message_time = Some(now);
        });

        let handler = self.on_change.lock(|slot| {
            let mut slot = slot.borrow_mut();
            match core::mem::replace(&mut *slot, HandlerSlot::Running) {
                HandlerSlot::Installed(handler) => Some(handler),
                other => {
                    *slot = other;
                    None
                }
            }
        });

        let Some(mut handler) = handler else {
            warn!(
                "{} was updated and nothing handled it, install a change handler on {}.{}",
                self.topic.as_str(),
                self.owner.type_name,
                self.field.as_str()
            );
            return Ok(());
        };

        let result = handler(self, outbox);

        // A handler installed or cleared while this one ran wins.
        self.on_change.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if matches!(*slot, HandlerSlot::Running) {
                *slot = HandlerSlot::Installed(handler);
            }
        });

        result
    }

    /// Installs the handler run after every inbound update, replacing any
    /// previous one.
    pub fn set_on_change<F>(&self, handler: F)
    where
        F: FnMut(&TopicBinding, &mut dyn PublishOutbox) -> Result<(), HandlerError>
            + Send
            + 'static,
    {
        self.on_change.lock(|slot| {
            *slot.borrow_mut() = HandlerSlot::Installed(Box::new(handler));
        });
    }

    /// Removes the change handler.
    pub fn clear_on_change(&self) {
        self.on_change.lock(|slot| *slot.borrow_mut() = HandlerSlot::Vacant);
    }

    pub fn has_on_change(&self) -> bool {
        self.on_change
            .lock(|slot| !matches!(*slot.borrow(), HandlerSlot::Vacant))
    }
}

impl fmt::Display for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.read().as_str())
    }
}

impl fmt::Debug for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match self.access {
            TopicAccess::Subscribe => "subscribing",
            TopicAccess::Publish => "publishing",
            TopicAccess::Both => "subscribing and publishing",
        };
        write!(
            f,
            "binding of {}.{}, {} to topic {}",
            self.owner.type_name, self.field, access, self.topic
        )
    }
}

impl PartialEq for TopicBinding {
    fn eq(&self, other: &Self) -> bool {
        self.read() == other.read()
    }
}

impl Eq for TopicBinding {}

impl PartialOrd for TopicBinding {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TopicBinding {
    fn cmp(&self, other: &Self) -> Ordering {
        self.read().cmp(&other.read())
    }
}

/// Hashes the value at the time of the call, consistent with `Eq`.
impl Hash for TopicBinding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.read().hash(state);
    }
}

macro_rules! impl_literal_cmp {
    ($($ty:ty),*) => {
        $(
            impl PartialEq<$ty> for TopicBinding {
                fn eq(&self, other: &$ty) -> bool {
                    self.read() == *other
                }
            }

            impl PartialOrd<$ty> for TopicBinding {
                fn partial_cmp(&self, other: &$ty) -> Option<Ordering> {
                    self.read().partial_cmp(other)
                }
            }
        )*
    };
}

impl_literal_cmp!(i32, i64, u32, u64, f32, f64, &str);

impl PartialEq<TopicValue> for TopicBinding {
    fn eq(&self, other: &TopicValue) -> bool {
        self.read() == *other
    }
}

impl PartialOrd<TopicValue> for TopicBinding {
    fn partial_cmp(&self, other: &TopicValue) -> Option<Ordering> {
        Some(self.read().cmp(other))
    }
}
