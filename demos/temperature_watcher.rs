//! Example: A thermostat bound to MQTT topics
//!
//! `TemperatureWatcher` follows `TEMPERATURE` and switches the air
//! conditioner on `AIR_COND/SOUTH` whenever the temperature crosses its hold
//! point. Everything runs against the in-memory loopback broker, so the
//! example works on the host without a network.
//!
//! # Key Concepts
//!
//! - Declare topics with `TopicDeclaration`
//! - Install change handlers in `PostBindHook::on_bound`
//! - Assigning a topic field publishes, the echo updates every subscriber
//!
//! Run with `cargo run --example temperature_watcher`.

use embassy_futures::block_on;
use myrtio_mqtt_binding::loopback::LoopbackBroker;
use myrtio_mqtt_binding::object::FieldTable;
use myrtio_mqtt_binding::runtime::{
    BindTarget, Binder, Dispatcher, PostBindHook, SubscriberRegistry, TopicDeclaration,
};

const TEMPERATURE_TOPIC: &str = "TEMPERATURE";
const AIR_COND_TOPIC: &str = "AIR_COND/SOUTH";

static REGISTRY: SubscriberRegistry = SubscriberRegistry::new();

/// Turns the south air conditioner on above `hold_temp`, off otherwise.
struct TemperatureWatcher {
    hold_temp: i32,
}

impl PostBindHook for TemperatureWatcher {
    fn on_bound(&mut self, fields: &FieldTable) {
        let hold = self.hold_temp;
        let Some(temperature) = fields.get("TEMPERATURE") else {
            return;
        };
        temperature.set_on_change(move |binding, outbox| {
            let command = if binding.read() > hold { "ON" } else { "OFF" };
            println!("temperature is {binding}, turning the air conditioner {command}");
            outbox.set("AIR_COND_SOUTH", command.into());
            Ok(())
        });
    }
}

impl BindTarget for TemperatureWatcher {
    fn post_bind_hook(&mut self) -> Option<&mut dyn PostBindHook> {
        Some(self)
    }
}

fn main() {
    let broker = LoopbackBroker::<16>::new();
    let binder = Binder::new(&broker, &REGISTRY);
    let dispatcher = Dispatcher::new(&broker, &REGISTRY);

    let outcome = block_on(binder.bind(
        TemperatureWatcher { hold_temp: 72 },
        TopicDeclaration::new()
            .subscribe(TEMPERATURE_TOPIC)
            .publish_all([TEMPERATURE_TOPIC, AIR_COND_TOPIC]),
    ));
    for failure in &outcome.failures {
        eprintln!("bind failed: {failure}");
    }
    let mut watcher = outcome.into_object();
    println!("{watcher:?}");

    for reading in [68, 85, 71] {
        if let Err(err) = block_on(watcher.set(&broker, "TEMPERATURE", reading)) {
            eprintln!("could not publish {reading}: {err}");
            continue;
        }
        block_on(broker.pump(&dispatcher));
        println!(
            "TEMPERATURE = {}, AIR_COND_SOUTH = {}",
            watcher.get("TEMPERATURE").unwrap_or_default(),
            watcher.get("AIR_COND_SOUTH").unwrap_or_default()
        );
    }

    // Ordinary fields are plain Rust fields. The handler keeps the hold
    // point it captured when the object was bound.
    watcher.hold_temp = 60;
    println!("hold point is now {}", watcher.hold_temp);

    for record in broker.published() {
        println!(
            "published {} <- {}",
            record.topic,
            String::from_utf8_lossy(&record.payload)
        );
    }
}
