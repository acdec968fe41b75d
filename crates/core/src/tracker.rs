//! Registry of live application tasks.
//!
//! Rust cannot enumerate the threads of a process, so tasks that should be
//! finished by the time the main task completes register themselves here.
//! The file watcher warns about any registration still alive when it exits
//! the process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// Set of currently running tracked tasks.
#[derive(Debug, Default)]
pub struct TaskTracker {
    next_id: AtomicU64,
    live: Mutex<BTreeMap<u64, String>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of tasks still registered, in registration order.
    pub fn live(&self) -> Vec<String> {
        self.live.lock().values().cloned().collect()
    }

    fn insert(&self, name: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(id, task = %name, "tracking task");
        self.live.lock().insert(id, name);
        id
    }

    fn remove(&self, id: u64) {
        if let Some(name) = self.live.lock().remove(&id) {
            trace!(id, task = %name, "task finished");
        }
    }
}

/// Guard for a tracked task. Dropping it marks the task finished.
#[derive(Debug)]
pub struct TrackedTask {
    tracker: Arc<TaskTracker>,
    id: u64,
}

impl TrackedTask {
    pub(crate) fn register(tracker: Arc<TaskTracker>, name: String) -> Self {
        let id = tracker.insert(name);
        Self { tracker, id }
    }
}

impl Drop for TrackedTask {
    fn drop(&mut self) {
        self.tracker.remove(self.id);
    }
}
