//! One thread per actor.
//!
//! An [`ActiveObject`] owns exactly one worker thread. The thread body
//! receives the shared running flag and is expected to loop while it is set;
//! `stop()` clears the flag, runs the unblock hook so a blocked body can
//! observe the change, then joins.

use crate::error::RuntimeError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type Body = Box<dyn FnOnce(&AtomicBool) + Send + 'static>;
type Unblock = Box<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

pub struct ActiveObject {
    name: String,
    running: Arc<AtomicBool>,
    body: Option<Body>,
    unblock: Unblock,
    handle: Option<JoinHandle<()>>,
    lifecycle: Lifecycle,
}

impl ActiveObject {
    /// Create an idle actor.
    ///
    /// `body` runs on the worker thread. `unblock` is called from `stop()`
    /// after the running flag is cleared and must wake whatever the body
    /// may be blocked on (post a sentinel, shut a socket down, notify a
    /// condition variable).
    pub fn new<B, U>(name: impl Into<String>, body: B, unblock: U) -> Self
    where
        B: FnOnce(&AtomicBool) + Send + 'static,
        U: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            running: Arc::new(AtomicBool::new(false)),
            body: Some(Box::new(body)),
            unblock: Box::new(unblock),
            handle: None,
            lifecycle: Lifecycle::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Spawn the worker thread. Calling this again is a no-op.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.lifecycle != Lifecycle::Idle {
            return Ok(());
        }
        let Some(body) = self.body.take() else {
            return Ok(());
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body(&running));

        match spawned {
            Ok(handle) => {
                debug!(actor = %self.name, "worker started");
                self.handle = Some(handle);
                self.lifecycle = Lifecycle::Running;
                Ok(())
            }
            Err(source) => {
                self.running.store(false, Ordering::Release);
                self.lifecycle = Lifecycle::Stopped;
                Err(RuntimeError::ThreadSpawn {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Request shutdown and join the worker. Calling this again is a no-op.
    ///
    /// When invoked from the worker thread itself the join is skipped; the
    /// body returns on its own once it sees the cleared flag.
    pub fn stop(&mut self) {
        match self.lifecycle {
            Lifecycle::Stopped => return,
            Lifecycle::Idle => {
                self.body = None;
                self.lifecycle = Lifecycle::Stopped;
                return;
            }
            Lifecycle::Running => {}
        }
        self.lifecycle = Lifecycle::Stopped;
        self.running.store(false, Ordering::Release);
        (self.unblock)();

        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!(actor = %self.name, "stop requested from own thread, not joining");
            return;
        }
        if handle.join().is_err() {
            error!(actor = %self.name, "worker thread panicked");
        } else {
            debug!(actor = %self.name, "worker stopped");
        }
    }
}

impl Drop for ActiveObject {
    fn drop(&mut self) {
        self.stop();
    }
}
