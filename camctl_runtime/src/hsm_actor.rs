//! Runs an [`Hsm`] on its own thread, fed by a broker-subscribed mailbox.

use crate::actor::ActiveObject;
use crate::broker::{EventBroker, Subscriber};
use crate::error::RuntimeError;
use crate::hsm::{Hsm, StateMachine};
use crate::mailbox::{Mailbox, Message};
use camctl_common::events::{EventPtr, Topic};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// A state machine actor.
///
/// Subscriptions are made when the actor is built, so events posted before
/// `start()` wait in the mailbox. Dropping the actor stops the thread and
/// removes every subscription.
pub struct StateMachineActor<M: StateMachine> {
    name: &'static str,
    inbox: Arc<Mailbox<Message>>,
    broker: Arc<EventBroker>,
    current: Arc<Mutex<M::State>>,
    worker: ActiveObject,
}

impl<M: StateMachine> StateMachineActor<M> {
    pub fn new(machine: M, broker: Arc<EventBroker>, topics: &[Topic]) -> Self {
        let name = machine.name();
        let inbox: Arc<Mailbox<Message>> = Arc::new(Mailbox::new());
        let current = Arc::new(Mutex::new(machine.initial_state()));

        for &topic in topics {
            broker.subscribe(inbox.clone(), topic);
        }

        let worker = {
            let inbox = Arc::clone(&inbox);
            let broker = Arc::clone(&broker);
            let current = Arc::clone(&current);
            let waker = Arc::clone(&inbox);
            ActiveObject::new(
                name,
                move |running| {
                    let mut hsm = Hsm::new(machine);
                    hsm.start(&broker, &inbox);
                    *current.lock() = hsm.state();
                    info!(machine = name, state = ?hsm.state(), "state machine running");

                    while running.load(Ordering::Acquire) {
                        match inbox.pop_blocking() {
                            Message::Event(event) => {
                                hsm.dispatch(event, &broker, &inbox);
                                *current.lock() = hsm.state();
                            }
                            Message::Wake => {}
                        }
                    }
                    info!(machine = name, state = ?hsm.state(), "state machine stopped");
                },
                move || {
                    waker.put(Message::Wake);
                },
            )
        };

        Self {
            name,
            inbox,
            broker,
            current,
            worker,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start(&mut self) -> Result<(), RuntimeError> {
        self.worker.start()
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Leaf state after the last completed dispatch.
    pub fn current_state(&self) -> M::State {
        *self.current.lock()
    }

    /// Put an event straight into this actor's mailbox.
    pub fn post(&self, event: impl Into<EventPtr>) {
        if self.inbox.put(Message::Event(event.into())) {
            warn!(machine = self.name, "mailbox full, oldest message dropped");
        }
    }

    /// The mailbox, as a broker subscriber.
    pub fn subscriber(&self) -> Arc<dyn Subscriber> {
        self.inbox.clone()
    }
}

impl<M: StateMachine> Drop for StateMachineActor<M> {
    fn drop(&mut self) {
        self.worker.stop();
        self.broker.unsubscribe_all(&self.inbox);
    }
}
