//! Completion latch for the application's main task.
//!
//! The file watcher and the termination hook both wait for the main task to
//! finish its graceful teardown before the process exits. The main task holds
//! a [`MainTaskGuard`]; dropping it releases every [`MainTask`] waiter.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct Completion {
    name: String,
    done: Mutex<bool>,
    finished: Condvar,
}

/// Waiter side of the main-task latch. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MainTask {
    inner: Arc<Completion>,
}

/// Held by the main task; dropping it marks the main task complete.
#[derive(Debug)]
pub struct MainTaskGuard {
    inner: Arc<Completion>,
}

impl MainTask {
    /// Capture the calling thread as the main task.
    pub fn current() -> (MainTask, MainTaskGuard) {
        let name = thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread::current().id()));
        Self::named(name)
    }

    /// Create a latch with an explicit name, for logging.
    pub fn named(name: impl Into<String>) -> (MainTask, MainTaskGuard) {
        let inner = Arc::new(Completion {
            name: name.into(),
            done: Mutex::new(false),
            finished: Condvar::new(),
        });
        (
            MainTask {
                inner: inner.clone(),
            },
            MainTaskGuard { inner },
        )
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.done.lock()
    }

    /// Block until the main task completes.
    ///
    /// With `timeout == None` this waits indefinitely. Returns whether the
    /// main task completed. A timeout too large to represent as a deadline
    /// is treated as `None`.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut done = self.inner.done.lock();
        if *done {
            return true;
        }
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        while !*done {
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .finished
                        .wait_until(&mut done, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.inner.finished.wait(&mut done),
            }
        }
        *done
    }
}

impl MainTaskGuard {
    /// Mark the main task complete now. Same as dropping the guard.
    pub fn complete(self) {}
}

impl Drop for MainTaskGuard {
    fn drop(&mut self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.finished.notify_all();
    }
}
