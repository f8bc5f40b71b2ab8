//! Timed capture sequences.
//!
//! ```text
//! Super
//! ├── Ready
//! └── Running
//!     ├── Capturing
//!     ├── Waiting
//!     └── Error
//! ```
//!
//! Each shot starts a deadline of `intervalms`. When the camera reports the
//! capture done the machine either waits out the rest of the interval or,
//! if the deadline already passed, shoots again straight away. A
//! non-positive interval shoots back to back. A total of zero or less
//! runs until `ModeStop`.
//!
//! A camera error parks the sequence in `Error`; it resumes where it left
//! off once the camera reports `CameraConnected` again.

use camctl_common::events::{Event, Topic};
use camctl_runtime::broker::DelayedId;
use camctl_runtime::hsm::{Context, Signal, StateMachine, StateResult};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TOPICS: &[Topic] = &[Topic::ModeFsm, Topic::RemoteCmd, Topic::CameraEvent];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalometerState {
    Super,
    Ready,
    Running,
    Capturing,
    Waiting,
    Error,
}

impl IntervalometerState {
    fn label(self) -> &'static str {
        match self {
            IntervalometerState::Super | IntervalometerState::Ready => "ready",
            IntervalometerState::Running | IntervalometerState::Capturing => "capturing",
            IntervalometerState::Waiting => "waiting",
            IntervalometerState::Error => "error",
        }
    }
}

pub struct Intervalometer {
    interval_ms: i32,
    total_captures: i32,
    num_captures: i32,
    deadline_expired: bool,
    deadline: Option<DelayedId>,
    /// Leaf to go back to after a camera error.
    resume: IntervalometerState,
    current: IntervalometerState,
}

impl Intervalometer {
    pub fn new() -> Self {
        Self {
            interval_ms: 0,
            total_captures: 0,
            num_captures: 0,
            deadline_expired: false,
            deadline: None,
            resume: IntervalometerState::Capturing,
            current: IntervalometerState::Ready,
        }
    }

    pub fn num_captures(&self) -> i32 {
        self.num_captures
    }

    fn report(&self) -> Event {
        Event::IntervalometerState {
            state: self.current.label().to_string(),
            intervalms: self.interval_ms,
            num_captures: self.num_captures,
            total_captures: self.total_captures,
        }
    }

    fn on_state_change(&mut self, state: IntervalometerState, ctx: &Context<'_>) {
        self.current = state;
        ctx.post(self.report(), Topic::ModeState);
    }

    fn cancel_deadline(&mut self, ctx: &Context<'_>) {
        if let Some(id) = self.deadline.take() {
            ctx.remove_delayed(id);
        }
    }

    fn state_super(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<IntervalometerState> {
        match signal {
            Signal::Init => StateResult::TransitionTo(IntervalometerState::Ready),
            Signal::Event(ev) if **ev == Event::GetCurrentMode => {
                ctx.post(self.report(), Topic::ModeState);
                StateResult::Handled
            }
            Signal::Event(_) => StateResult::Delegate,
            _ => StateResult::Handled,
        }
    }

    fn state_ready(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<IntervalometerState> {
        match signal {
            Signal::Entry => {
                self.on_state_change(IntervalometerState::Ready, ctx);
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::IntervalometerStart {
                    intervalms,
                    total_captures,
                } => {
                    self.interval_ms = *intervalms;
                    self.total_captures = *total_captures;
                    self.num_captures = 0;
                    info!(interval_ms = self.interval_ms, total = self.total_captures, "sequence started");
                    StateResult::TransitionTo(IntervalometerState::Capturing)
                }
                _ => StateResult::Delegate,
            },
            _ => StateResult::Handled,
        }
    }

    fn state_running(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<IntervalometerState> {
        match signal {
            Signal::Init => StateResult::TransitionTo(IntervalometerState::Capturing),
            Signal::Exit => {
                self.cancel_deadline(ctx);
                ctx.post(Event::ModeStopped, Topic::ModeController);
                info!(captures = self.num_captures, "sequence ended");
                StateResult::Handled
            }
            Signal::Event(ev) if **ev == Event::ModeStop => {
                StateResult::TransitionTo(IntervalometerState::Ready)
            }
            Signal::Event(_) => StateResult::Delegate,
            Signal::Entry => StateResult::Handled,
        }
    }

    fn state_capturing(
        &mut self,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<IntervalometerState> {
        match signal {
            Signal::Entry => {
                self.on_state_change(IntervalometerState::Capturing, ctx);
                self.deadline_expired = false;
                self.cancel_deadline(ctx);
                ctx.post(Event::CameraCmdCapture, Topic::CameraCmd);
                if self.interval_ms > 0 {
                    let delay = Duration::from_millis(u64::from(self.interval_ms.unsigned_abs()));
                    self.deadline = Some(ctx.post_delayed(
                        Event::IntervalometerDeadlineExpired,
                        Topic::ModeFsm,
                        delay,
                    ));
                }
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::IntervalometerDeadlineExpired => {
                    self.deadline = None;
                    self.deadline_expired = true;
                    StateResult::Handled
                }
                Event::CameraCaptureDone { .. } => {
                    self.num_captures += 1;
                    debug!(done = self.num_captures, total = self.total_captures, "capture done");
                    if self.total_captures > 0 && self.num_captures >= self.total_captures {
                        StateResult::TransitionTo(IntervalometerState::Ready)
                    } else if self.interval_ms <= 0 || self.deadline_expired {
                        StateResult::TransitionTo(IntervalometerState::Capturing)
                    } else {
                        StateResult::TransitionTo(IntervalometerState::Waiting)
                    }
                }
                Event::CameraError => {
                    warn!("camera error while capturing, pausing sequence");
                    self.resume = IntervalometerState::Capturing;
                    StateResult::TransitionTo(IntervalometerState::Error)
                }
                _ => StateResult::Delegate,
            },
            _ => StateResult::Handled,
        }
    }

    fn state_waiting(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<IntervalometerState> {
        match signal {
            Signal::Entry => {
                self.on_state_change(IntervalometerState::Waiting, ctx);
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::IntervalometerDeadlineExpired => {
                    self.deadline = None;
                    StateResult::TransitionTo(IntervalometerState::Capturing)
                }
                Event::CameraError => {
                    warn!("camera error while waiting, pausing sequence");
                    self.resume = IntervalometerState::Waiting;
                    StateResult::TransitionTo(IntervalometerState::Error)
                }
                _ => StateResult::Delegate,
            },
            _ => StateResult::Handled,
        }
    }

    fn state_error(&mut self, signal: &Signal, ctx: &mut Context<'_>) -> StateResult<IntervalometerState> {
        match signal {
            Signal::Entry => {
                self.on_state_change(IntervalometerState::Error, ctx);
                StateResult::Handled
            }
            Signal::Event(ev) => match &**ev {
                Event::IntervalometerDeadlineExpired => {
                    self.deadline = None;
                    self.deadline_expired = true;
                    StateResult::Handled
                }
                Event::CameraConnected => {
                    let target = if self.deadline_expired {
                        IntervalometerState::Capturing
                    } else {
                        self.resume
                    };
                    info!(resume = ?target, "camera back, resuming sequence");
                    StateResult::TransitionTo(target)
                }
                _ => StateResult::Delegate,
            },
            _ => StateResult::Handled,
        }
    }
}

impl Default for Intervalometer {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for Intervalometer {
    type State = IntervalometerState;

    fn name(&self) -> &'static str {
        "intervalometer"
    }

    fn initial_state(&self) -> IntervalometerState {
        IntervalometerState::Super
    }

    fn parent(&self, state: IntervalometerState) -> Option<IntervalometerState> {
        use IntervalometerState::*;
        match state {
            Super => None,
            Ready | Running => Some(Super),
            Capturing | Waiting | Error => Some(Running),
        }
    }

    fn handle(
        &mut self,
        state: IntervalometerState,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<IntervalometerState> {
        match state {
            IntervalometerState::Super => self.state_super(signal, ctx),
            IntervalometerState::Ready => self.state_ready(signal, ctx),
            IntervalometerState::Running => self.state_running(signal, ctx),
            IntervalometerState::Capturing => self.state_capturing(signal, ctx),
            IntervalometerState::Waiting => self.state_waiting(signal, ctx),
            IntervalometerState::Error => self.state_error(signal, ctx),
        }
    }
}
