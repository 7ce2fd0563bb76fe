//! Subscriber registry: which bindings receive which topic.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::binding::TopicBinding;

type Registrants = BTreeMap<String, Vec<Weak<TopicBinding>>>;

/// Maps a topic to the bindings subscribed to it, in registration order.
///
/// The registry only holds weak references: when a bound object is dropped
/// its entries die with it and are pruned on the next lookup, so no explicit
/// deregistration is needed.
///
/// `new` is `const`, so the registry can live in a `static` for the lifetime
/// of the program and be passed by reference to the binder and dispatcher.
///
/// # Example
///
/// ```ignore
/// static REGISTRY: SubscriberRegistry = SubscriberRegistry::new();
///
/// let binder = Binder::new(&transport, &REGISTRY);
/// let dispatcher = Dispatcher::new(&transport, &REGISTRY);
/// ```
pub struct SubscriberRegistry {
    topics: Mutex<CriticalSectionRawMutex, RefCell<Registrants>>,
}

impl SubscriberRegistry {
    /// Create a new empty registry.
    pub const fn new() -> Self {
        Self {
            topics: Mutex::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Register `binding` under its own topic.
    ///
    /// Returns `false` if the binding's owner is already registered for the
    /// topic; an object never appears twice under one topic.
    pub fn insert(&self, binding: &Arc<TopicBinding>) -> bool {
        let owner = binding.owner_id();
        self.topics.lock(|topics| {
            let mut topics = topics.borrow_mut();
            let entries = topics.entry(String::from(binding.topic())).or_default();
            entries.retain(|entry| entry.strong_count() > 0);

            let duplicate = entries
                .iter()
                .filter_map(Weak::upgrade)
                .any(|existing| existing.owner_id() == owner);
            if duplicate {
                return false;
            }

            entries.push(Arc::downgrade(binding));
            true
        })
    }

    /// Live registrants for `topic`, in registration order.
    ///
    /// The returned bindings are strong references taken under the lock; the
    /// lock is released before this returns, so callers may run arbitrary
    /// code on them.
    pub fn registrants(&self, topic: &str) -> Vec<Arc<TopicBinding>> {
        self.topics.lock(|topics| {
            let mut topics = topics.borrow_mut();
            let Some(entries) = topics.get_mut(topic) else {
                return Vec::new();
            };

            let live: Vec<_> = entries.iter().filter_map(Weak::upgrade).collect();
            if live.len() != entries.len() {
                entries.retain(|entry| entry.strong_count() > 0);
                if entries.is_empty() {
                    topics.remove(topic);
                }
            }
            live
        })
    }

    /// Returns `true` if at least one live binding is registered for `topic`.
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.lock(|topics| {
            topics
                .borrow()
                .get(topic)
                .is_some_and(|entries| entries.iter().any(|entry| entry.strong_count() > 0))
        })
    }

    /// Topics with at least one registrant, in lexical order.
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock(|topics| {
            topics
                .borrow()
                .iter()
                .filter(|(_, entries)| entries.iter().any(|entry| entry.strong_count() > 0))
                .map(|(topic, _)| topic.clone())
                .collect()
        })
    }

    /// Number of live registrations across all topics.
    pub fn len(&self) -> usize {
        self.topics.lock(|topics| {
            topics
                .borrow()
                .values()
                .flatten()
                .filter(|entry| entry.strong_count() > 0)
                .count()
        })
    }

    /// Check if the registry has no live registrations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entries of bindings whose owner no longer exists.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        self.topics.lock(|topics| {
            let mut topics = topics.borrow_mut();
            let mut removed = 0;
            for entries in topics.values_mut() {
                let before = entries.len();
                entries.retain(|entry| entry.strong_count() > 0);
                removed += before - entries.len();
            }
            topics.retain(|_, entries| !entries.is_empty());
            removed
        })
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{OwnerRef, TopicAccess};
    use crate::transport::QoS;
    use crate::util::{field_name, topic_name};

    fn binding(topic: &str, owner: &OwnerRef) -> Arc<TopicBinding> {
        Arc::new(TopicBinding::new(
            topic_name(topic).unwrap(),
            field_name(topic).unwrap(),
            TopicAccess::Subscribe,
            QoS::AtMostOnce,
            false,
            owner.clone(),
        ))
    }

    #[test]
    fn files_bindings_under_their_topic_in_order() {
        let registry = SubscriberRegistry::new();
        let first = binding("TEMPERATURE", &OwnerRef::detached("A"));
        let second = binding("TEMPERATURE", &OwnerRef::detached("B"));
        let other = binding("HUMIDITY", &OwnerRef::detached("A"));

        assert!(registry.insert(&first));
        assert!(registry.insert(&second));
        assert!(registry.insert(&other));

        let found = registry.registrants("TEMPERATURE");
        assert_eq!(found.len(), 2);
        assert!(Arc::ptr_eq(&found[0], &first));
        assert!(Arc::ptr_eq(&found[1], &second));
        assert!(found.iter().all(|b| b.topic() == "TEMPERATURE"));
        assert_eq!(registry.topics(), ["HUMIDITY", "TEMPERATURE"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn an_owner_appears_once_per_topic() {
        let registry = SubscriberRegistry::new();
        let owner = OwnerRef::detached("A");
        let a = binding("TEMPERATURE", &owner);
        let again = binding("TEMPERATURE", &owner);

        assert!(registry.insert(&a));
        assert!(!registry.insert(&again));
        assert!(!registry.insert(&a));
        assert_eq!(registry.registrants("TEMPERATURE").len(), 1);
    }

    #[test]
    fn unknown_topics_have_no_registrants() {
        let registry = SubscriberRegistry::new();
        assert!(registry.registrants("NOBODY/LISTENS").is_empty());
        assert!(!registry.contains("NOBODY/LISTENS"));
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_bindings_are_pruned() {
        let registry = SubscriberRegistry::new();
        let kept = binding("TEMPERATURE", &OwnerRef::detached("A"));
        let dropped = binding("TEMPERATURE", &OwnerRef::detached("B"));
        let gone = binding("HUMIDITY", &OwnerRef::detached("B"));
        registry.insert(&kept);
        registry.insert(&dropped);
        registry.insert(&gone);

        drop(dropped);
        assert_eq!(registry.registrants("TEMPERATURE").len(), 1);

        drop(gone);
        assert!(!registry.contains("HUMIDITY"));
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.topics(), ["TEMPERATURE"]);
    }
}
