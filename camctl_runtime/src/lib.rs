//! camctl runtime
//!
//! Concurrency substrate shared by every controller:
//!
//! - [`mailbox`] - bounded MPSC queue that overwrites its oldest entry when full
//! - [`actor`] - `ActiveObject`, one worker thread with cooperative stop
//! - [`broker`] - topic fan-out plus a timer thread for delayed, cancellable posts
//! - [`hsm`] - hierarchical state machine engine with deferral
//! - [`hsm_actor`] - a state machine running on its own actor thread
//!
//! The only way two actors interact is by posting events through the
//! broker. A broker is created once at startup and passed around as an
//! `Arc`; there is no global instance.

pub mod actor;
pub mod broker;
pub mod error;
pub mod hsm;
pub mod hsm_actor;
pub mod mailbox;

pub mod prelude {
    pub use crate::actor::ActiveObject;
    pub use crate::broker::{DelayedId, EventBroker, MIN_DELAY, Subscriber};
    pub use crate::error::RuntimeError;
    pub use crate::hsm::{Context, Hsm, Signal, StateMachine, StateResult};
    pub use crate::hsm_actor::StateMachineActor;
    pub use crate::mailbox::{Mailbox, Message};
}
