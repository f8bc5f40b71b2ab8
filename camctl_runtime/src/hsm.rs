//! Hierarchical state machine engine.
//!
//! A concrete machine implements [`StateMachine`]: a state id type, the
//! parent table (`parent(state)`) and one `handle` function that matches on
//! `(state, signal)`. The engine owns the current leaf state and performs
//! dispatch, superstate delegation, the exit/entry walk, init chaining and
//! event deferral against that table.
//!
//! # Transition rules
//!
//! For a transition from the current leaf `A` to target `B` the engine
//!
//! 1. finds the LCA: the deepest state of `A`'s chain that is a strict
//!    ancestor of `B` (so `A == B` and "target is an ancestor of `A`" both
//!    exit and re-enter the target),
//! 2. sends `Exit` from `A` upwards, stopping below the LCA,
//! 3. sends `Entry` from below the LCA down to `B`,
//! 4. sends `Init` to `B`, following any transition it returns before
//!    control goes back to the caller.
//!
//! Transitions requested while handling `Entry` or `Exit` are ignored.

use crate::broker::{DelayedId, EventBroker};
use crate::mailbox::{Mailbox, Message};
use camctl_common::consts::DEFERRED_CAPACITY;
use camctl_common::events::{Event, EventPtr, Topic};
use heapless::Deque;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Guard against a cyclic parent table.
const MAX_DEPTH: usize = 16;

/// What a state handler is asked to process.
#[derive(Debug, Clone)]
pub enum Signal {
    Entry,
    Exit,
    Init,
    Event(EventPtr),
}

impl Signal {
    pub fn event(&self) -> Option<&Event> {
        match self {
            Signal::Event(ev) => Some(&**ev),
            _ => None,
        }
    }
}

/// Outcome of one handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateResult<S> {
    Handled,
    TransitionTo(S),
    /// Pass the signal to the parent listed in the state table.
    Delegate,
}

/// A concrete hierarchical machine.
pub trait StateMachine: Send + 'static {
    type State: Copy + Eq + Debug + Send + 'static;

    /// Name used in logs and as the actor thread name.
    fn name(&self) -> &'static str;

    /// State entered when the machine starts. Its `Init` usually picks the
    /// default leaf.
    fn initial_state(&self) -> Self::State;

    /// Superstate of `state`, `None` for a top-level state.
    fn parent(&self, state: Self::State) -> Option<Self::State>;

    fn handle(
        &mut self,
        state: Self::State,
        signal: &Signal,
        ctx: &mut Context<'_>,
    ) -> StateResult<Self::State>;
}

struct Deferred {
    queue: Deque<EventPtr, DEFERRED_CAPACITY>,
    replay: bool,
}

/// Services available to state handlers.
///
/// Everything a handler does to the outside world goes through here; the
/// machine never touches another actor directly.
pub struct Context<'a> {
    broker: &'a EventBroker,
    inbox: &'a Mailbox<Message>,
    deferred: &'a mut Deferred,
    machine: &'static str,
}

impl Context<'_> {
    pub fn post(&self, event: impl Into<EventPtr>, topic: Topic) {
        self.broker.post(event, topic);
    }

    pub fn post_delayed(
        &self,
        event: impl Into<EventPtr>,
        topic: Topic,
        delay: Duration,
    ) -> DelayedId {
        self.broker.post_delayed(event, topic, delay)
    }

    pub fn remove_delayed(&self, id: DelayedId) -> bool {
        self.broker.remove_delayed(id)
    }

    /// Queue an event to this machine's own mailbox, bypassing the broker.
    pub fn post_self(&self, event: impl Into<EventPtr>) {
        if self.inbox.put(Message::Event(event.into())) {
            warn!(machine = self.machine, "own mailbox full, oldest message dropped");
        }
    }

    /// Keep `event` for later replay through [`Context::process_deferred`].
    pub fn defer(&mut self, event: &EventPtr) {
        let queue = &mut self.deferred.queue;
        if queue.is_full() {
            if let Some(lost) = queue.pop_front() {
                warn!(machine = self.machine, event = %lost, "deferred queue full, dropping oldest");
            }
        }
        let _ = queue.push_back(Arc::clone(event));
        debug!(machine = self.machine, event = %event, "deferred");
    }

    /// Replay all deferred events, in arrival order, once the current
    /// dispatch has completed.
    pub fn process_deferred(&mut self) {
        if !self.deferred.queue.is_empty() {
            self.deferred.replay = true;
        }
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.queue.len()
    }
}

struct Core<M: StateMachine> {
    machine: M,
    state: M::State,
}

impl<M: StateMachine> Core<M> {
    /// `state` followed by its ancestors, innermost first.
    fn chain(&self, state: M::State) -> Vec<M::State> {
        let mut chain = Vec::with_capacity(4);
        let mut cursor = Some(state);
        while let Some(s) = cursor {
            if chain.len() == MAX_DEPTH {
                warn!(machine = self.machine.name(), "state hierarchy deeper than {}", MAX_DEPTH);
                break;
            }
            chain.push(s);
            cursor = self.machine.parent(s);
        }
        chain
    }

    /// Deliver a pseudo-signal that must not cause a transition.
    fn signal(&mut self, state: M::State, signal: &Signal, ctx: &mut Context<'_>) {
        let name = self.machine.name();
        debug!(machine = name, ?state, ?signal, "pseudo-signal");
        if let StateResult::TransitionTo(target) = self.machine.handle(state, signal, ctx) {
            warn!(machine = name, ?state, ?target, "transition from {signal:?} ignored");
        }
    }

    fn enter_initial(&mut self, ctx: &mut Context<'_>) {
        let initial = self.machine.initial_state();
        for s in self.chain(initial).into_iter().rev() {
            self.signal(s, &Signal::Entry, ctx);
        }
        self.state = initial;
        self.init(ctx);
    }

    fn dispatch(&mut self, signal: &Signal, ctx: &mut Context<'_>) {
        let mut handler = self.state;
        for _ in 0..MAX_DEPTH {
            match self.machine.handle(handler, signal, ctx) {
                StateResult::Handled => return,
                StateResult::TransitionTo(target) => {
                    self.transition(target, ctx);
                    return;
                }
                StateResult::Delegate => match self.machine.parent(handler) {
                    Some(parent) => handler = parent,
                    None => break,
                },
            }
        }
        debug!(
            machine = self.machine.name(),
            state = ?self.state,
            event = ?signal.event().map(Event::name),
            "unhandled event dropped"
        );
    }

    fn transition(&mut self, target: M::State, ctx: &mut Context<'_>) {
        self.step(target, ctx);
        self.init(ctx);
    }

    /// Follow `Init` transitions until a state keeps itself.
    fn init(&mut self, ctx: &mut Context<'_>) {
        for _ in 0..MAX_DEPTH {
            match self.machine.handle(self.state, &Signal::Init, ctx) {
                StateResult::TransitionTo(next) => self.step(next, ctx),
                _ => return,
            }
        }
        warn!(machine = self.machine.name(), "init chain too long");
    }

    fn step(&mut self, target: M::State, ctx: &mut Context<'_>) {
        let source_chain = self.chain(self.state);
        let above_target = self
            .machine
            .parent(target)
            .map(|p| self.chain(p))
            .unwrap_or_default();
        let lca = source_chain
            .iter()
            .copied()
            .find(|s| above_target.contains(s));

        for s in source_chain.iter().copied().take_while(|s| Some(*s) != lca) {
            self.signal(s, &Signal::Exit, ctx);
        }

        let mut entry_path = Vec::with_capacity(4);
        let mut cursor = Some(target);
        while cursor != lca {
            let Some(s) = cursor else { break };
            entry_path.push(s);
            cursor = self.machine.parent(s);
        }
        for s in entry_path.into_iter().rev() {
            self.signal(s, &Signal::Entry, ctx);
        }

        debug!(machine = self.machine.name(), from = ?self.state, to = ?target, "transition");
        self.state = target;
    }
}

/// A machine plus its current state and deferred queue.
///
/// Not thread-safe by itself; a [`crate::hsm_actor::StateMachineActor`]
/// owns one on its worker thread.
pub struct Hsm<M: StateMachine> {
    core: Core<M>,
    deferred: Deferred,
    started: bool,
}

impl<M: StateMachine> Hsm<M> {
    pub fn new(machine: M) -> Self {
        let state = machine.initial_state();
        Self {
            core: Core { machine, state },
            deferred: Deferred {
                queue: Deque::new(),
                replay: false,
            },
            started: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.core.machine.name()
    }

    /// Current leaf state.
    pub fn state(&self) -> M::State {
        self.core.state
    }

    /// True if the current leaf is `state` or nested inside it.
    pub fn is_in(&self, state: M::State) -> bool {
        self.core.chain(self.core.state).contains(&state)
    }

    pub fn machine(&self) -> &M {
        &self.core.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.core.machine
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.queue.len()
    }

    /// Enter the initial state. Only the first call has an effect.
    pub fn start(&mut self, broker: &EventBroker, inbox: &Mailbox<Message>) {
        if self.started {
            return;
        }
        self.started = true;
        let name = self.name();
        let mut ctx = Context {
            broker,
            inbox,
            deferred: &mut self.deferred,
            machine: name,
        };
        self.core.enter_initial(&mut ctx);
        self.replay_deferred(broker, inbox);
    }

    /// Run one event to completion, including any deferred replay it
    /// triggers.
    pub fn dispatch(&mut self, event: EventPtr, broker: &EventBroker, inbox: &Mailbox<Message>) {
        if !self.started {
            self.start(broker, inbox);
        }
        self.dispatch_one(Signal::Event(event), broker, inbox);
        self.replay_deferred(broker, inbox);
    }

    fn dispatch_one(&mut self, signal: Signal, broker: &EventBroker, inbox: &Mailbox<Message>) {
        let name = self.name();
        let mut ctx = Context {
            broker,
            inbox,
            deferred: &mut self.deferred,
            machine: name,
        };
        self.core.dispatch(&signal, &mut ctx);
    }

    fn replay_deferred(&mut self, broker: &EventBroker, inbox: &Mailbox<Message>) {
        while self.deferred.replay {
            self.deferred.replay = false;
            let mut batch = std::mem::replace(&mut self.deferred.queue, Deque::new());
            debug!(machine = self.name(), count = batch.len(), "replaying deferred events");
            while let Some(event) = batch.pop_front() {
                self.dispatch_one(Signal::Event(event), broker, inbox);
            }
        }
    }
}
