//! Gate between remote commands and the camera controller.
//!
//! While enabled, every event received on [`Topic::RemoteCmd`] is
//! re-posted on [`Topic::CameraCmd`]. While disabled, events are held back
//! and forwarded in arrival order once the gate is enabled again.

use camctl_common::events::{Event, Topic};
use camctl_runtime::hsm::{Context, Signal, StateMachine, StateResult};
use std::sync::Arc;
use tracing::info;

pub const TOPICS: &[Topic] = &[Topic::RemoteCmd];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughState {
    Enabled,
    Disabled,
}

#[derive(Debug, Default)]
pub struct PassThrough;

impl PassThrough {
    pub fn new() -> Self {
        Self
    }
}

impl StateMachine for PassThrough {
    type State = PassThroughState;

    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn initial_state(&self) -> PassThroughState {
        PassThroughState::Enabled
    }

    fn parent(&self, _state: PassThroughState) -> Option<PassThroughState> {
        None
    }

    fn handle(
        &mut self,
        state: PassThroughState,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<PassThroughState> {
        let ev = match signal {
            Signal::Entry if state == PassThroughState::Enabled => {
                info!("pass-through enabled");
                ctx.process_deferred();
                return StateResult::Handled;
            }
            Signal::Entry => {
                info!("pass-through disabled");
                return StateResult::Handled;
            }
            Signal::Exit | Signal::Init => return StateResult::Handled,
            Signal::Event(ev) => ev,
        };

        match (state, &**ev) {
            (PassThroughState::Enabled, Event::DisableEventPassThrough) => {
                StateResult::TransitionTo(PassThroughState::Disabled)
            }
            (PassThroughState::Disabled, Event::EnableEventPassThrough) => {
                StateResult::TransitionTo(PassThroughState::Enabled)
            }
            (_, Event::EnableEventPassThrough | Event::DisableEventPassThrough) => {
                StateResult::Handled
            }
            (PassThroughState::Enabled, _) => {
                ctx.post(Arc::clone(ev), Topic::CameraCmd);
                StateResult::Handled
            }
            (PassThroughState::Disabled, _) => {
                ctx.defer(ev);
                StateResult::Handled
            }
        }
    }
}
