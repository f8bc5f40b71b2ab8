//! Topic-based publish/subscribe with delayed, cancellable delivery.
//!
//! A single [`EventBroker`] is created at startup and handed to every actor
//! as an `Arc`. Subscribers register per [`Topic`]; `post` fans an event out
//! to a snapshot of the topic's subscribers taken under the subscription
//! lock, then delivers outside it. Delivery is a non-blocking mailbox `put`.
//!
//! Delayed events live in a timer set ordered by deadline and insertion
//! sequence. A dedicated timer thread sleeps until the nearest deadline and
//! delivers due entries exactly like `post`.

use crate::actor::ActiveObject;
use crate::error::RuntimeError;
use crate::mailbox::{Mailbox, Message};
use camctl_common::consts::MIN_DELAY_MS;
use camctl_common::events::{EventPtr, Topic};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Shortest delay honoured by [`EventBroker::post_delayed`].
pub const MIN_DELAY: Duration = Duration::from_millis(MIN_DELAY_MS);

/// Longest delay honoured by [`EventBroker::post_delayed`].
pub const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Handle returned by `post_delayed`, used to cancel the delivery.
pub type DelayedId = u64;

/// Anything that can receive events from the broker.
///
/// `deliver` is called on the publisher's thread and must not block.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: &EventPtr, topic: Topic);
}

impl<const N: usize> Subscriber for Mailbox<Message, N> {
    fn deliver(&self, event: &EventPtr, topic: Topic) {
        if self.put(Message::Event(Arc::clone(event))) {
            warn!(%topic, event = %event, "mailbox full, oldest message dropped");
        }
    }
}

fn same_subscriber<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

struct DelayedEvent {
    event: EventPtr,
    topic: Topic,
}

#[derive(Default)]
struct TimerSet {
    pending: BTreeMap<(Instant, DelayedId), DelayedEvent>,
    deadlines: HashMap<DelayedId, Instant>,
    next_id: DelayedId,
}

impl TimerSet {
    fn insert(&mut self, deadline: Instant, event: EventPtr, topic: Topic) -> DelayedId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.pending.insert((deadline, id), DelayedEvent { event, topic });
        self.deadlines.insert(id, deadline);
        id
    }

    fn remove(&mut self, id: DelayedId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.pending.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every entry due at `now`, earliest first.
    fn take_due(&mut self, now: Instant) -> Vec<DelayedEvent> {
        let mut due = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > now {
                break;
            }
            due.push(entry.remove());
            self.deadlines.remove(&id);
        }
        due
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.deadlines.clear();
    }
}

struct Shared {
    subscribers: Mutex<HashMap<Topic, Vec<Arc<dyn Subscriber>>>>,
    timers: Mutex<TimerSet>,
    timer_wake: Condvar,
}

impl Shared {
    fn post(&self, event: EventPtr, topic: Topic) {
        let targets: Vec<Arc<dyn Subscriber>> = {
            let subscribers = self.subscribers.lock();
            subscribers.get(&topic).cloned().unwrap_or_default()
        };
        trace!(%topic, event = %event, subscribers = targets.len(), "post");
        for target in &targets {
            target.deliver(&event, topic);
        }
    }

    fn run_timer(&self, running: &AtomicBool) {
        let mut timers = self.timers.lock();
        while running.load(Ordering::Acquire) {
            let due = timers.take_due(Instant::now());
            if !due.is_empty() {
                MutexGuard::unlocked(&mut timers, || {
                    for entry in due {
                        self.post(entry.event, entry.topic);
                    }
                });
                continue;
            }
            match timers.next_deadline() {
                Some(deadline) => {
                    self.timer_wake.wait_until(&mut timers, deadline);
                }
                None => self.timer_wake.wait(&mut timers),
            }
        }
        debug!(pending = timers.pending.len(), "timer thread exiting");
    }
}

/// Process-wide event exchange.
pub struct EventBroker {
    shared: Arc<Shared>,
    timer: Mutex<ActiveObject>,
}

impl EventBroker {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            subscribers: Mutex::new(HashMap::new()),
            timers: Mutex::new(TimerSet::default()),
            timer_wake: Condvar::new(),
        });

        let body_shared = Arc::clone(&shared);
        let wake_shared = Arc::clone(&shared);
        let timer = ActiveObject::new(
            "broker-timer",
            move |running| body_shared.run_timer(running),
            move || {
                // Holding the lock orders this notify after the timer's flag check.
                let _timers = wake_shared.timers.lock();
                wake_shared.timer_wake.notify_all();
            },
        );

        Self {
            shared,
            timer: Mutex::new(timer),
        }
    }

    /// Start the timer thread. Idempotent.
    pub fn start(&self) -> Result<(), RuntimeError> {
        self.timer.lock().start()
    }

    /// Stop the timer thread. Pending delayed events are kept but never fire.
    pub fn stop(&self) {
        self.timer.lock().stop();
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().is_running()
    }

    // ─── Subscriptions ──────────────────────────────────────────────

    /// Register `subscriber` on `topic`. Subscribing twice has no effect.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>, topic: Topic) {
        let mut subscribers = self.shared.subscribers.lock();
        let list = subscribers.entry(topic).or_default();
        if !list.iter().any(|s| same_subscriber(s, &subscriber)) {
            list.push(subscriber);
        }
    }

    pub fn unsubscribe<S: Subscriber + ?Sized>(&self, subscriber: &Arc<S>, topic: Topic) {
        let mut subscribers = self.shared.subscribers.lock();
        if let Some(list) = subscribers.get_mut(&topic) {
            list.retain(|s| !same_subscriber(s, subscriber));
        }
    }

    /// Remove `subscriber` from every topic.
    pub fn unsubscribe_all<S: Subscriber + ?Sized>(&self, subscriber: &Arc<S>) {
        let mut subscribers = self.shared.subscribers.lock();
        for list in subscribers.values_mut() {
            list.retain(|s| !same_subscriber(s, subscriber));
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.shared
            .subscribers
            .lock()
            .get(&topic)
            .map_or(0, Vec::len)
    }

    // ─── Delivery ───────────────────────────────────────────────────

    /// Deliver `event` to every current subscriber of `topic`.
    pub fn post(&self, event: impl Into<EventPtr>, topic: Topic) {
        self.shared.post(event.into(), topic);
    }

    /// Deliver `event` on `topic` once `delay` has elapsed.
    ///
    /// Delays shorter than [`MIN_DELAY`] are raised to it and delays longer
    /// than [`MAX_DELAY`] are cut down to it.
    pub fn post_delayed(
        &self,
        event: impl Into<EventPtr>,
        topic: Topic,
        delay: Duration,
    ) -> DelayedId {
        if delay > MAX_DELAY {
            warn!(delay_s = delay.as_secs(), "delay out of range, clamped");
        }
        let deadline = Instant::now() + delay.clamp(MIN_DELAY, MAX_DELAY);
        let mut timers = self.shared.timers.lock();
        let sooner = timers.next_deadline().is_none_or(|next| deadline < next);
        let id = timers.insert(deadline, event.into(), topic);
        if sooner {
            self.shared.timer_wake.notify_one();
        }
        id
    }

    /// Cancel a delayed event. Returns `false` if it already fired or was
    /// never scheduled.
    pub fn remove_delayed(&self, id: DelayedId) -> bool {
        self.shared.timers.lock().remove(id)
    }

    /// Cancel every pending delayed event.
    pub fn clear_delayed(&self) {
        self.shared.timers.lock().clear();
    }

    pub fn pending_delayed(&self) -> usize {
        self.shared.timers.lock().pending.len()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBroker {
    fn drop(&mut self) {
        self.timer.get_mut().stop();
    }
}
