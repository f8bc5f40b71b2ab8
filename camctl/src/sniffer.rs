//! Debug tap on the broker.
//!
//! Subscribes to every topic and logs each event with its JSON body under
//! the `event` target, so `RUST_LOG=event=debug` shows the full traffic.

use camctl_common::events::{EventPtr, Topic};
use camctl_runtime::broker::{EventBroker, Subscriber};
use std::sync::Arc;
use tracing::debug;

struct Tap;

impl Subscriber for Tap {
    fn deliver(&self, event: &EventPtr, topic: Topic) {
        debug!(target: "event", "{} -> {}    {}", event.name(), topic, event.to_json());
    }
}

pub struct EventSniffer {
    broker: Arc<EventBroker>,
    tap: Arc<Tap>,
}

impl EventSniffer {
    pub fn attach(broker: Arc<EventBroker>) -> Self {
        let tap = Arc::new(Tap);
        for topic in Topic::ALL {
            broker.subscribe(tap.clone(), topic);
        }
        Self { broker, tap }
    }
}

impl Drop for EventSniffer {
    fn drop(&mut self) {
        self.broker.unsubscribe_all(&self.tap);
    }
}
