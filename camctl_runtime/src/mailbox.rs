//! Bounded multi-producer, single-consumer queue.
//!
//! `put` never blocks. When the ring is full the oldest unread element is
//! discarded to make room, so a slow consumer always sees the most recent
//! traffic. Consumers block on `pop_blocking` until something arrives.

use camctl_common::consts::MAILBOX_CAPACITY;
use camctl_common::events::EventPtr;
use heapless::Deque;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Item stored in an actor mailbox.
#[derive(Debug, Clone)]
pub enum Message {
    /// An event delivered by the broker or posted by the owner itself.
    Event(EventPtr),
    /// Unblocks the consumer so it can observe its stop flag.
    Wake,
}

/// Fixed-capacity FIFO guarded by one mutex and one condition variable.
pub struct Mailbox<T, const N: usize = MAILBOX_CAPACITY> {
    queue: Mutex<Deque<T, N>>,
    available: Condvar,
}

impl<T, const N: usize> Mailbox<T, N> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Deque::new()),
            available: Condvar::new(),
        }
    }

    /// Append `item`, overwriting the oldest element if the queue is full.
    ///
    /// Returns `true` when an unread element was discarded.
    pub fn put(&self, item: T) -> bool {
        let mut queue = self.queue.lock();
        let overwritten = queue.is_full() && queue.pop_front().is_some();
        // Room is guaranteed after the pop above.
        let _ = queue.push_back(item);
        drop(queue);
        self.available.notify_one();
        overwritten
    }

    /// Block until an element is available and return the oldest one.
    pub fn pop_blocking(&self) -> T {
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return item;
            }
            self.available.wait(&mut queue);
        }
    }

    /// Like `pop_blocking`, but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut queue, deadline).timed_out() {
                return queue.pop_front();
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    /// Drop every queued element.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.lock().is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for Mailbox<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let mb: Mailbox<u32, 4> = Mailbox::new();
        assert!(!mb.put(1));
        assert!(!mb.put(2));
        assert!(!mb.put(3));
        assert_eq!(mb.pop_blocking(), 1);
        assert_eq!(mb.pop_blocking(), 2);
        assert_eq!(mb.pop_blocking(), 3);
        assert!(mb.is_empty());
    }

    #[test]
    fn full_queue_overwrites_oldest() {
        let mb: Mailbox<u32, 3> = Mailbox::new();
        for i in 0..3 {
            assert!(!mb.put(i));
        }
        assert!(mb.is_full());
        assert!(mb.put(3));
        assert!(mb.put(4));
        assert_eq!(mb.len(), 3);
        assert_eq!(mb.try_pop(), Some(2));
        assert_eq!(mb.try_pop(), Some(3));
        assert_eq!(mb.try_pop(), Some(4));
        assert_eq!(mb.try_pop(), None);
    }

    #[test]
    fn pop_blocks_until_put() {
        let mb: Arc<Mailbox<&'static str, 2>> = Arc::new(Mailbox::new());
        let consumer = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || mb.pop_blocking())
        };
        thread::sleep(Duration::from_millis(20));
        mb.put("hello");
        assert_eq!(consumer.join().unwrap(), "hello");
    }

    #[test]
    fn pop_timeout_expires_on_empty_queue() {
        let mb: Mailbox<u8, 2> = Mailbox::new();
        let start = Instant::now();
        assert_eq!(mb.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn many_producers_lose_nothing_below_capacity() {
        let mb: Arc<Mailbox<u32, 64>> = Arc::new(Mailbox::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let mb = Arc::clone(&mb);
                thread::spawn(move || {
                    for i in 0..16 {
                        mb.put(p * 100 + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(mb.len(), 64);

        // Per-producer order is preserved.
        let mut last = [None::<u32>; 4];
        while let Some(v) = mb.try_pop() {
            let p = (v / 100) as usize;
            if let Some(prev) = last[p] {
                assert!(v > prev);
            }
            last[p] = Some(v);
        }
    }

    #[test]
    fn clear_empties_queue() {
        let mb: Mailbox<u8, 4> = Mailbox::new();
        mb.put(1);
        mb.put(2);
        mb.clear();
        assert!(mb.is_empty());
        assert_eq!(mb.capacity(), 4);
    }
}
