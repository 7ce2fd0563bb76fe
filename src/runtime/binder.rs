//! Binding declared topics to a new object.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::binding::{OwnerRef, TopicAccess, TopicBinding};
use crate::error::{BindError, InvalidTopicReason};
use crate::object::{BoundObject, FieldTable, ObjectId};
use crate::transport::{PubSubTransport, QoS};
use crate::util::{self, FieldName, TopicName};

use super::registry::SubscriberRegistry;
use super::traits::BindTarget;

/// Transport options applied to every topic of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BindOptions {
    /// QoS requested for every subscription.
    pub subscribe_qos: QoS,
    /// QoS used for every publish.
    pub publish_qos: QoS,
    /// Whether published values are retained by the broker.
    pub retain: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            subscribe_qos: QoS::AtMostOnce,
            publish_qos: QoS::AtMostOnce,
            retain: false,
        }
    }
}

/// The topics an object subscribes to and may publish to.
///
/// A topic may appear in both lists; it then gets a single binding that can
/// do both.
///
/// # Example
///
/// ```
/// use myrtio_mqtt_binding::runtime::TopicDeclaration;
///
/// let declaration = TopicDeclaration::new()
///     .subscribe("TEMPERATURE")
///     .publish("TEMPERATURE")
///     .publish("AIR_COND/SOUTH");
///
/// assert_eq!(declaration.subscriptions(), ["TEMPERATURE"]);
/// assert_eq!(declaration.publications(), ["TEMPERATURE", "AIR_COND/SOUTH"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicDeclaration {
    subscriptions: Vec<String>,
    publications: Vec<String>,
    options: BindOptions,
}

impl TopicDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic to subscribe to.
    pub fn subscribe(mut self, topic: impl Into<String>) -> Self {
        self.subscriptions.push(topic.into());
        self
    }

    /// Adds a topic the object may publish to.
    pub fn publish(mut self, topic: impl Into<String>) -> Self {
        self.publications.push(topic.into());
        self
    }

    /// Adds several topics to subscribe to.
    pub fn subscribe_all<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Adds several topics the object may publish to.
    pub fn publish_all<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.publications.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn with_options(mut self, options: BindOptions) -> Self {
        self.options = options;
        self
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn publications(&self) -> &[String] {
        &self.publications
    }

    pub fn options(&self) -> BindOptions {
        self.options
    }
}

/// The result of binding an object.
///
/// Binding is best effort: a topic that fails is reported in `failures` and
/// every other topic is bound regardless.
#[derive(Debug)]
pub struct BindOutcome<O> {
    pub object: BoundObject<O>,
    pub failures: Vec<BindError>,
}

impl<O> BindOutcome<O> {
    /// Returns `true` if every declared topic was bound.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Discards the failures and returns the object.
    pub fn into_object(self) -> BoundObject<O> {
        self.object
    }

    /// Returns the object if every declared topic was bound, the failures
    /// otherwise.
    pub fn complete(self) -> Result<BoundObject<O>, Vec<BindError>> {
        if self.failures.is_empty() {
            Ok(self.object)
        } else {
            Err(self.failures)
        }
    }
}

struct PlannedTopic {
    topic: TopicName,
    field: FieldName,
    access: TopicAccess,
}

/// Creates bindings for declared topics, subscribes them through the
/// transport and records them in the registry.
pub struct Binder<'a, T> {
    transport: &'a T,
    registry: &'a SubscriberRegistry,
}

impl<'a, T: PubSubTransport> Binder<'a, T> {
    pub fn new(transport: &'a T, registry: &'a SubscriberRegistry) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Binds `declaration` to `target`.
    ///
    /// 1. Every subscribe topic is subscribed through the transport. Accepted
    ///    topics get a subscribed binding and a registry entry; rejected ones
    ///    are reported as [`BindError::SubscribeFailed`].
    /// 2. Publish topics that already have a binding gain publish permission
    ///    on that same binding; the rest get a publish-only binding, which is
    ///    never registered.
    /// 3. The target's [`PostBindHook`](super::PostBindHook), if any, runs
    ///    with the finished field table.
    ///
    /// Topics that cannot form a field name are reported as
    /// [`BindError::InvalidTopicName`] and skipped before any transport call.
    pub async fn bind<O: BindTarget>(
        &self,
        mut target: O,
        declaration: TopicDeclaration,
    ) -> BindOutcome<O> {
        let owner = short_type_name::<O>();
        let id = ObjectId::next();
        let options = declaration.options();
        let mut failures = Vec::new();
        let mut plan: Vec<PlannedTopic> = Vec::new();
        let mut attempted: Vec<&str> = Vec::new();
        // Topics already reported as unbindable, reported once.
        let mut rejected: Vec<&str> = Vec::new();

        for topic in declaration.subscriptions() {
            if attempted.contains(&topic.as_str()) {
                debug!("{} declares subscription {} twice", owner, topic.as_str());
                continue;
            }
            attempted.push(topic.as_str());

            let (topic_name, field) = match plan_topic(topic, &plan) {
                Ok(planned) => planned,
                Err(err) => {
                    warn!("{} cannot bind topic {}", owner, topic.as_str());
                    rejected.push(topic.as_str());
                    failures.push(err);
                    continue;
                }
            };

            let ack = self.transport.subscribe(topic, options.subscribe_qos).await;
            if !ack.is_success() {
                warn!(
                    "could not subscribe to {}, message id {}, error code {}",
                    topic.as_str(),
                    ack.message_id,
                    u8::from(ack.code)
                );
                failures.push(BindError::SubscribeFailed {
                    topic: topic_name,
                    code: ack.code,
                    message_id: ack.message_id,
                });
                continue;
            }

            plan.push(PlannedTopic {
                topic: topic_name,
                field,
                access: TopicAccess::Subscribe,
            });
        }

        for topic in declaration.publications() {
            if let Some(existing) = plan.iter_mut().find(|p| p.topic.as_str() == topic.as_str()) {
                existing.access = existing.access.with_publish();
                continue;
            }
            if rejected.contains(&topic.as_str()) {
                continue;
            }

            match plan_topic(topic, &plan) {
                Ok((topic, field)) => plan.push(PlannedTopic {
                    topic,
                    field,
                    access: TopicAccess::Publish,
                }),
                Err(err) => {
                    warn!("{} cannot bind topic {}", owner, topic.as_str());
                    rejected.push(topic.as_str());
                    failures.push(err);
                }
            }
        }

        let fields = Arc::new_cyclic(|table| FieldTable {
            owner,
            id,
            bindings: plan
                .into_iter()
                .map(|planned| {
                    Arc::new(TopicBinding::new(
                        planned.topic,
                        planned.field,
                        planned.access,
                        options.publish_qos,
                        options.retain,
                        OwnerRef {
                            type_name: owner,
                            id,
                            table: table.clone(),
                        },
                    ))
                })
                .collect(),
        });

        for binding in fields.iter().filter(|binding| binding.is_subscribed()) {
            if self.registry.insert(binding) {
                debug!("added {} to subscribers of {}", owner, binding.topic());
            }
        }

        if let Some(hook) = target.post_bind_hook() {
            hook.on_bound(&fields);
        }

        info!(
            "bound {} to {} topics ({} failed)",
            owner,
            fields.len(),
            failures.len()
        );

        BindOutcome {
            object: BoundObject::new(target, fields, declaration),
            failures,
        }
    }
}

fn plan_topic(topic: &str, plan: &[PlannedTopic]) -> Result<(TopicName, FieldName), BindError> {
    let invalid = |reason| BindError::InvalidTopicName {
        topic: String::from(topic),
        reason,
    };

    let field = util::field_name(topic).map_err(invalid)?;
    if plan.iter().any(|p| p.field == field) {
        return Err(invalid(InvalidTopicReason::FieldCollision));
    }
    let topic = util::topic_name(topic).map_err(invalid)?;
    Ok((topic, field))
}

fn short_type_name<O>() -> &'static str {
    let full = core::any::type_name::<O>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;
    use crate::loopback::LoopbackBroker;
    use crate::object::FieldTable;
    use crate::runtime::PostBindHook;
    use embassy_futures::block_on;

    struct Thermostat {
        hooked: usize,
    }

    impl PostBindHook for Thermostat {
        fn on_bound(&mut self, fields: &FieldTable) {
            assert!(fields.get("TEMPERATURE").is_some());
            self.hooked += 1;
        }
    }

    impl BindTarget for Thermostat {
        fn post_bind_hook(&mut self) -> Option<&mut dyn PostBindHook> {
            Some(self)
        }
    }

    struct Plain;

    impl BindTarget for Plain {}

    fn thermostat_declaration() -> TopicDeclaration {
        TopicDeclaration::new()
            .subscribe("TEMPERATURE")
            .publish_all(["TEMPERATURE", "AIR_COND/SOUTH"])
    }

    #[test]
    fn shared_topic_gets_one_binding_with_both_flags() {
        let broker = LoopbackBroker::<4>::new();
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let outcome = block_on(binder.bind(Thermostat { hooked: 0 }, thermostat_declaration()));
        assert!(outcome.is_complete());
        let object = outcome.into_object();

        assert_eq!(object.fields().len(), 2);
        let temperature = object.binding("TEMPERATURE").unwrap();
        assert!(temperature.is_subscribed() && temperature.can_publish());
        assert!(Arc::ptr_eq(
            temperature,
            object.binding_for_topic("TEMPERATURE").unwrap()
        ));

        let air = object.binding("AIR_COND_SOUTH").unwrap();
        assert_eq!(air.topic(), "AIR_COND/SOUTH");
        assert_eq!(air.access(), TopicAccess::Publish);

        assert_eq!(broker.subscriptions(), ["TEMPERATURE"]);
        assert_eq!(registry.topics(), ["TEMPERATURE"]);
        assert_eq!(object.hooked, 1);
        assert_eq!(temperature.owner_name(), "Thermostat");
        assert!(core::ptr::eq(&*temperature.owner().unwrap(), object.fields()));
    }

    #[test]
    fn failed_subscription_is_reported_and_not_registered() {
        let broker = LoopbackBroker::<4>::new();
        broker.fail_subscribe("HUMIDITY", ResultCode::Refused);
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let outcome = block_on(binder.bind(
            Plain,
            TopicDeclaration::new().subscribe_all(["HUMIDITY", "TEMPERATURE"]),
        ));

        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            BindError::SubscribeFailed { topic, code: ResultCode::Refused, .. } if topic.as_str() == "HUMIDITY"
        ));
        assert!(outcome.object.binding("HUMIDITY").is_none());
        assert!(outcome.object.binding("TEMPERATURE").is_some());
        assert!(!registry.contains("HUMIDITY"));
        assert!(registry.contains("TEMPERATURE"));
    }

    #[test]
    fn publish_topic_survives_failed_subscription() {
        let broker = LoopbackBroker::<4>::new();
        broker.fail_subscribe("TEMPERATURE", ResultCode::NoConnection);
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let outcome = block_on(binder.bind(Plain, thermostat_declaration()));
        assert_eq!(outcome.failures.len(), 1);
        let temperature = outcome.object.binding("TEMPERATURE").unwrap();
        assert_eq!(temperature.access(), TopicAccess::Publish);
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_topics_are_skipped_without_touching_siblings() {
        let broker = LoopbackBroker::<4>::new();
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let outcome = block_on(binder.bind(
            Plain,
            TopicDeclaration::new()
                .subscribe_all(["sensors/+/temp", "TEMPERATURE"])
                .publish_all(["AIR_COND/SOUTH", "AIR_COND_SOUTH", "2nd/floor"]),
        ));

        let reasons: Vec<_> = outcome
            .failures
            .iter()
            .map(|err| match err {
                BindError::InvalidTopicName { reason, .. } => *reason,
                other => panic!("unexpected failure {other:?}"),
            })
            .collect();
        assert_eq!(
            reasons,
            [
                InvalidTopicReason::InvalidCharacter('+'),
                InvalidTopicReason::FieldCollision,
                InvalidTopicReason::StartsWithDigit,
            ]
        );
        assert_eq!(broker.subscriptions(), ["TEMPERATURE"]);
        assert_eq!(
            outcome.object.fields().field_names().collect::<Vec<_>>(),
            ["TEMPERATURE", "AIR_COND_SOUTH"]
        );
        assert_eq!(
            outcome.object.binding("AIR_COND_SOUTH").unwrap().topic(),
            "AIR_COND/SOUTH"
        );
    }

    #[test]
    fn invalid_topic_is_reported_once() {
        let broker = LoopbackBroker::<4>::new();
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let outcome = block_on(binder.bind(
            Plain,
            TopicDeclaration::new()
                .subscribe("bad-topic")
                .publish_all(["bad-topic", "bad-topic", "worse+topic", "worse+topic"]),
        ));

        let topics: Vec<_> = outcome
            .failures
            .iter()
            .filter_map(BindError::topic)
            .collect();
        assert_eq!(topics, ["bad-topic", "worse+topic"]);
        assert!(outcome.object.fields().is_empty());
        assert!(broker.subscriptions().is_empty());
    }

    #[test]
    fn duplicate_declarations_bind_once() {
        let broker = LoopbackBroker::<4>::new();
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let outcome = block_on(binder.bind(
            Plain,
            TopicDeclaration::new()
                .subscribe_all(["TEMPERATURE", "TEMPERATURE"])
                .publish_all(["FAN", "FAN"]),
        ));
        assert!(outcome.is_complete());
        assert_eq!(outcome.object.fields().len(), 2);
        assert_eq!(broker.subscriptions(), ["TEMPERATURE"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_objects_get_distinct_bindings() {
        let broker = LoopbackBroker::<4>::new();
        let registry = SubscriberRegistry::new();
        let binder = Binder::new(&broker, &registry);

        let a = block_on(binder.bind(Plain, thermostat_declaration())).into_object();
        let b = block_on(binder.bind(Plain, thermostat_declaration())).into_object();

        assert_ne!(a.id(), b.id());
        assert!(!Arc::ptr_eq(
            a.binding("TEMPERATURE").unwrap(),
            b.binding("TEMPERATURE").unwrap()
        ));
        assert_eq!(registry.registrants("TEMPERATURE").len(), 2);

        drop(a);
        assert_eq!(registry.registrants("TEMPERATURE").len(), 1);
    }

    #[test]
    fn type_names_are_shortened() {
        assert_eq!(short_type_name::<Thermostat>(), "Thermostat");
        assert_eq!(short_type_name::<alloc::vec::Vec<u8>>(), "Vec");
        assert_eq!(short_type_name::<()>(), "()");
    }
}
