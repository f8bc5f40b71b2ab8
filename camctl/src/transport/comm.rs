//! Broker side of the remote link.
//!
//! Outgoing: everything posted on the camera, mode and heartbeat topics is
//! serialized and queued for the client while one is connected.
//! Incoming: every frame is decoded into an [`Event`] and posted on
//! [`Topic::RemoteCmd`]. Frames that do not decode are logged and dropped.

use super::server::{JsonTcpServer, ServerHandle, TransportError};
use crate::config::TransportConfig;
use camctl_common::events::{Event, EventDecodeError, EventPtr, Topic};
use camctl_runtime::broker::{EventBroker, Subscriber};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{trace, warn};

/// Topics relayed to the remote client.
pub const FORWARDED_TOPICS: &[Topic] = &[
    Topic::CameraConfig,
    Topic::CameraEvent,
    Topic::ModeState,
    Topic::Heartbeat,
];

struct Forwarder {
    handle: ServerHandle,
}

impl Subscriber for Forwarder {
    fn deliver(&self, event: &EventPtr, topic: Topic) {
        if self.handle.send(event.to_json()) {
            trace!(%topic, event = %event, "forwarded to client");
        }
    }
}

fn post_remote(broker: &EventBroker, value: &Value) {
    match Event::from_json(value) {
        Ok(event) => broker.post(event, Topic::RemoteCmd),
        Err(EventDecodeError::UnknownId(id)) => warn!(id, "unknown remote event id, dropped"),
        Err(e) => warn!("undecodable remote event dropped: {e}"),
    }
}

pub struct CommManager {
    server: JsonTcpServer,
    broker: Arc<EventBroker>,
    forwarder: Arc<Forwarder>,
}

impl CommManager {
    /// Bind the server and subscribe to the forwarded topics.
    pub fn new(config: &TransportConfig, broker: Arc<EventBroker>) -> Result<Self, TransportError> {
        let inbound = Arc::clone(&broker);
        let server = JsonTcpServer::bind(config.socket_addr(), config.max_frame_len, move |value| {
            post_remote(&inbound, &value);
        })?;

        let forwarder = Arc::new(Forwarder {
            handle: server.handle(),
        });
        for &topic in FORWARDED_TOPICS {
            broker.subscribe(forwarder.clone(), topic);
        }

        Ok(Self {
            server,
            broker,
            forwarder,
        })
    }

    pub fn start(&mut self) -> Result<(), TransportError> {
        self.server.start()
    }

    pub fn stop(&mut self) {
        self.broker.unsubscribe_all(&self.forwarder);
        self.server.stop();
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_connected()
    }
}

impl Drop for CommManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camctl_runtime::mailbox::{Mailbox, Message};
    use serde_json::json;

    #[test]
    fn remote_values_are_posted_on_remote_cmd() {
        let broker = EventBroker::new();
        let remote: Arc<Mailbox<Message>> = Arc::new(Mailbox::new());
        broker.subscribe(remote.clone(), Topic::RemoteCmd);

        post_remote(&broker, &json!({"event_id": 34, "aperture": 800}));
        post_remote(&broker, &json!({"event_id": 9999}));
        post_remote(&broker, &json!({"event_id": 34}));
        post_remote(&broker, &json!([1, 2, 3]));

        assert_eq!(remote.len(), 1);
        assert!(matches!(
            remote.try_pop(),
            Some(Message::Event(ev)) if *ev == Event::ConfigSetAperture { aperture: 800 }
        ));
    }
}
