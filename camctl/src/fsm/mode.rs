//! Operating mode selection.
//!
//! `Super ⊃ {ModeSelection, Running}`. The controller starts in manual
//! mode; a `ModeIntervalometer` request hands the run over to the
//! intervalometer and waits for `ModeStopped`. `Super` also keeps the
//! heartbeat ticking.

use camctl_common::prelude::{Event, Topic};
use camctl_runtime::prelude::*;
use std::time::Duration;
use tracing::info;

pub const TOPICS: &[Topic] = &[Topic::RemoteCmd, Topic::ModeController, Topic::Heartbeat];

pub const MANUAL: &str = "Manual";
pub const INTERVALOMETER: &str = "Intervalometer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeState {
    Super,
    ModeSelection,
    Running,
}

pub struct ModeController {
    heartbeat: Duration,
    current_mode: &'static str,
}

impl ModeController {
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            heartbeat,
            current_mode: MANUAL,
        }
    }

    pub fn current_mode(&self) -> &'static str {
        self.current_mode
    }

    fn announce_mode(&self, ctx: &Context<'_>) {
        ctx.post(
            Event::ValueCurrentMode {
                mode: self.current_mode.to_string(),
            },
            Topic::ModeState,
        );
    }

    fn state_super(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<ModeState> {
        match signal {
            Signal::Entry => {
                ctx.post_delayed(Event::HeartBeat, Topic::Heartbeat, self.heartbeat);
                StateResult::Handled
            }
            Signal::Init => StateResult::TransitionTo(ModeState::ModeSelection),
            Signal::Exit => StateResult::Handled,
            Signal::Event(ev) => match &**ev {
                Event::HeartBeat => {
                    ctx.post_delayed(Event::HeartBeat, Topic::Heartbeat, self.heartbeat);
                    StateResult::Handled
                }
                Event::GetCurrentMode => {
                    self.announce_mode(ctx);
                    StateResult::Handled
                }
                _ => StateResult::Delegate,
            },
        }
    }

    fn state_selection(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<ModeState> {
        match signal {
            Signal::Entry => {
                self.current_mode = MANUAL;
                self.announce_mode(ctx);
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::ModeIntervalometer {
                    intervalms,
                    total_captures,
                } => {
                    self.current_mode = INTERVALOMETER;
                    self.announce_mode(ctx);
                    ctx.post(
                        Event::IntervalometerStart {
                            intervalms: *intervalms,
                            total_captures: *total_captures,
                        },
                        Topic::ModeFsm,
                    );
                    info!(
                        "starting intervalometer, interval {:.1}s, {} captures",
                        *intervalms as f32 / 1000.0,
                        total_captures
                    );
                    StateResult::TransitionTo(ModeState::Running)
                }
                _ => StateResult::Delegate,
            },
            Signal::Init | Signal::Exit => StateResult::Handled,
        }
    }

    fn state_running(&mut self, signal: &Signal) -> StateResult<ModeState> {
        match signal {
            Signal::Event(ev) if **ev == Event::ModeStopped => {
                StateResult::TransitionTo(ModeState::ModeSelection)
            }
            Signal::Event(_) => StateResult::Delegate,
            _ => StateResult::Handled,
        }
    }
}

impl StateMachine for ModeController {
    type State = ModeState;

    fn name(&self) -> &'static str {
        "mode"
    }

    fn initial_state(&self) -> ModeState {
        ModeState::Super
    }

    fn parent(&self, state: ModeState) -> Option<ModeState> {
        match state {
            ModeState::Super => None,
            ModeState::ModeSelection | ModeState::Running => Some(ModeState::Super),
        }
    }

    fn handle(
        &mut self,
        state: ModeState,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<ModeState> {
        match state {
            ModeState::Super => self.state_super(signal, ctx),
            ModeState::ModeSelection => self.state_selection(signal, ctx),
            ModeState::Running => self.state_running(signal),
        }
    }
}
