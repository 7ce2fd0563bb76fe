use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use embassy_futures::block_on;
use myrtio_mqtt_binding::loopback::LoopbackBroker;
use myrtio_mqtt_binding::object::FieldTable;
use myrtio_mqtt_binding::runtime::{
    BindOptions, BindTarget, Binder, Dispatcher, PostBindHook, SubscriberRegistry,
    TopicDeclaration,
};
use myrtio_mqtt_binding::{BindError, QoS, TopicAccess};

struct TemperatureWatcher {
    hold_temp: i32,
    changes: Arc<AtomicUsize>,
}

impl PostBindHook for TemperatureWatcher {
    fn on_bound(&mut self, fields: &FieldTable) {
        let hold = self.hold_temp;
        let changes = self.changes.clone();
        if let Some(temperature) = fields.get("TEMPERATURE") {
            temperature.set_on_change(move |binding, outbox| {
                changes.fetch_add(1, Ordering::SeqCst);
                let command = if binding.read() > hold { "ON" } else { "OFF" };
                outbox.set("AIR_COND_SOUTH", command.into());
                Ok(())
            });
        }
    }
}

impl BindTarget for TemperatureWatcher {
    fn post_bind_hook(&mut self) -> Option<&mut dyn PostBindHook> {
        Some(self)
    }
}

struct Panel;

impl BindTarget for Panel {}

fn watcher_declaration() -> TopicDeclaration {
    TopicDeclaration::new()
        .subscribe("TEMPERATURE")
        .publish_all(["TEMPERATURE", "AIR_COND/SOUTH"])
}

#[test]
fn publishing_a_reading_switches_the_air_conditioner() {
    let broker = LoopbackBroker::<16>::new();
    let registry = SubscriberRegistry::new();
    let changes = Arc::new(AtomicUsize::new(0));

    let outcome = block_on(Binder::new(&broker, &registry).bind(
        TemperatureWatcher {
            hold_temp: 72,
            changes: changes.clone(),
        },
        watcher_declaration(),
    ));
    assert!(outcome.is_complete());
    let watcher = outcome.into_object();

    let temperature = watcher.binding("TEMPERATURE").unwrap();
    assert_eq!(temperature.access(), TopicAccess::Both);
    assert!(!temperature.read().is_set());

    block_on(watcher.set(&broker, "TEMPERATURE", 85)).unwrap();
    assert_eq!(watcher.get("TEMPERATURE").unwrap(), "85");
    assert_eq!(changes.load(Ordering::SeqCst), 0);

    let dispatcher = Dispatcher::new(&broker, &registry);
    assert_eq!(block_on(broker.pump(&dispatcher)), 1);

    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert!(temperature.last_message_time().is_some());
    assert_eq!(watcher.get("AIR_COND_SOUTH").unwrap(), "ON");

    let published: Vec<_> = broker
        .published()
        .into_iter()
        .map(|record| (record.topic, record.payload))
        .collect();
    assert_eq!(
        published,
        [
            (String::from("TEMPERATURE"), b"85".to_vec()),
            (String::from("AIR_COND/SOUTH"), b"ON".to_vec()),
        ]
    );

    // A reading from another client.
    assert!(broker.deliver("TEMPERATURE", b"70"));
    block_on(broker.pump(&dispatcher));
    assert_eq!(watcher.get("AIR_COND_SOUTH").unwrap(), "OFF");
    assert_eq!(changes.load(Ordering::SeqCst), 2);

    // Ordinary fields are untouched by the bindings.
    assert_eq!(watcher.hold_temp, 72);
}

#[test]
fn every_subscriber_sees_the_same_message() {
    let broker = LoopbackBroker::<16>::new();
    let registry = SubscriberRegistry::new();
    let binder = Binder::new(&broker, &registry);

    let first_changes = Arc::new(AtomicUsize::new(0));
    let second_changes = Arc::new(AtomicUsize::new(0));
    let first = block_on(binder.bind(
        TemperatureWatcher {
            hold_temp: 72,
            changes: first_changes.clone(),
        },
        watcher_declaration(),
    ))
    .into_object();
    let second = block_on(binder.bind(
        TemperatureWatcher {
            hold_temp: 90,
            changes: second_changes.clone(),
        },
        watcher_declaration(),
    ))
    .into_object();

    let dispatcher = Dispatcher::new(&broker, &registry);
    let report = block_on(dispatcher.on_message("TEMPERATURE", b"85"));
    assert_eq!(report.delivered, 2);
    assert_eq!(report.published, 2);
    assert!(report.is_clean());

    assert_eq!(first_changes.load(Ordering::SeqCst), 1);
    assert_eq!(second_changes.load(Ordering::SeqCst), 1);
    assert_eq!(first.get("AIR_COND_SOUTH").unwrap(), "ON");
    assert_eq!(second.get("AIR_COND_SOUTH").unwrap(), "OFF");

    drop(second);
    let report = block_on(dispatcher.on_message("TEMPERATURE", b"60"));
    assert_eq!(report.delivered, 1);
    assert_eq!(second_changes.load(Ordering::SeqCst), 1);
}

#[test]
fn subscribe_only_fields_refuse_assignment() {
    let broker = LoopbackBroker::<16>::new();
    let registry = SubscriberRegistry::new();
    let panel = block_on(
        Binder::new(&broker, &registry)
            .bind(Panel, TopicDeclaration::new().subscribe("TEMPERATURE")),
    )
    .into_object();

    let err = block_on(panel.set(&broker, "TEMPERATURE", 85)).unwrap_err();
    assert!(matches!(err, BindError::PermissionDenied { .. }));
    assert!(!panel.get("TEMPERATURE").unwrap().is_set());
    assert!(broker.published().is_empty());

    let err = block_on(panel.set(&broker, "HUMIDITY", 40)).unwrap_err();
    assert!(matches!(err, BindError::UnknownField { .. }));
}

#[test]
fn numerically_equal_values_compare_and_hash_equal() {
    let broker = LoopbackBroker::<16>::new();
    let registry = SubscriberRegistry::new();
    let binder = Binder::new(&broker, &registry);
    let declaration = TopicDeclaration::new().publish("LEVEL");

    let a = block_on(binder.bind(Panel, declaration.clone())).into_object();
    let b = block_on(binder.bind(Panel, declaration)).into_object();
    block_on(a.set(&broker, "LEVEL", "6")).unwrap();
    block_on(b.set(&broker, "LEVEL", "6.0")).unwrap();

    let (a, b) = (a.binding("LEVEL").unwrap(), b.binding("LEVEL").unwrap());
    assert_eq!(**a, **b);
    assert!(**a == 6);
    assert!(**a < 10);

    let hasher = RandomState::new();
    assert_eq!(hasher.hash_one(&**a), hasher.hash_one(&**b));
}

#[test]
fn options_reach_the_transport() {
    let broker = LoopbackBroker::<16>::new();
    let registry = SubscriberRegistry::new();
    let options = BindOptions {
        publish_qos: QoS::AtLeastOnce,
        retain: true,
        ..BindOptions::default()
    };
    let object = block_on(Binder::new(&broker, &registry).bind(
        Panel,
        TopicDeclaration::new()
            .publish("STATUS")
            .with_options(options),
    ))
    .into_object();

    block_on(object.set(&broker, "STATUS", true)).unwrap();
    let published = broker.published();
    let record = &published[0];
    assert_eq!(record.qos, QoS::AtLeastOnce);
    assert!(record.retain);
    assert_eq!(record.payload, b"true");
}
