//! The shared shutdown flag.
//!
//! [`ShutdownState`] is a single boolean that any thread may set or observe.
//! Setting it to `true` wakes every waiter, both threads blocked in
//! [`ShutdownState::wait`] and async tasks parked in
//! [`ShutdownState::wait_async`]. On the `false -> true` transition the
//! state also runs its on-shutdown callbacks, in registration order, on the
//! calling thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;
use tracing::debug;

use crate::tracker::{TaskTracker, TrackedTask};

/// Side effect run when shutdown is first requested.
pub type OnShutdown = Box<dyn Fn() + Send + Sync>;

/// Shared shutdown flag with broadcast wake-up.
///
/// Share it as `Arc<ShutdownState>`; there is no global instance.
pub struct ShutdownState {
    requested: AtomicBool,
    /// Serializes stores and pairs with `changed` so no wake-up is lost.
    lock: Mutex<()>,
    changed: Condvar,
    watch_tx: watch::Sender<bool>,
    on_shutdown: Vec<OnShutdown>,
    tasks: Arc<TaskTracker>,
}

impl ShutdownState {
    /// Create a state that is not shutting down and has no callbacks.
    pub fn new() -> Self {
        Self::with_initial(false)
    }

    /// Create a state starting at `initial`.
    pub fn with_initial(initial: bool) -> Self {
        Self::build(initial, Vec::new())
    }

    /// Create a state with callbacks run on the `false -> true` transition.
    pub fn with_on_shutdown(on_shutdown: Vec<OnShutdown>) -> Self {
        Self::build(false, on_shutdown)
    }

    fn build(initial: bool, on_shutdown: Vec<OnShutdown>) -> Self {
        let (watch_tx, _) = watch::channel(initial);
        Self {
            requested: AtomicBool::new(initial),
            lock: Mutex::new(()),
            changed: Condvar::new(),
            watch_tx,
            on_shutdown,
            tasks: Arc::new(TaskTracker::new()),
        }
    }

    /// Store `value`. Storing `true` wakes every waiter.
    ///
    /// Callbacks run synchronously before this returns, only when the store
    /// flips the flag from `false` to `true`.
    pub fn set_shutdown_requested(&self, value: bool) {
        let previous = {
            let _guard = self.lock.lock();
            let previous = self.requested.swap(value, Ordering::SeqCst);
            self.watch_tx.send_replace(value);
            if value {
                self.changed.notify_all();
            }
            previous
        };

        if value && !previous {
            debug!(callbacks = self.on_shutdown.len(), "shutdown requested");
            for callback in &self.on_shutdown {
                callback();
            }
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Block the calling thread until shutdown is requested.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        while !self.is_shutdown_requested() {
            self.changed.wait(&mut guard);
        }
    }

    /// Block until shutdown is requested or `timeout` elapses.
    ///
    /// Returns the flag value at the time of return. A timeout too large to
    /// represent as a deadline waits without bound.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_shutdown_requested() {
            return true;
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut guard = self.lock.lock();
        while !self.is_shutdown_requested() {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_shutdown_requested()
    }

    /// Wait asynchronously until shutdown is requested.
    ///
    /// Resolves immediately if the flag is already set.
    pub async fn wait_async(&self) {
        let mut rx = self.watch_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Register a live application task.
    ///
    /// The task counts as running until the returned guard is dropped. Tasks
    /// still registered when the main task completes are reported by the file
    /// watcher before the process exits.
    pub fn track_task(&self, name: impl Into<String>) -> TrackedTask {
        TrackedTask::register(self.tasks.clone(), name.into())
    }

    /// Names of tracked tasks that are still running.
    pub fn live_tasks(&self) -> Vec<String> {
        self.tasks.live()
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownState")
            .field("requested", &self.is_shutdown_requested())
            .field("on_shutdown", &self.on_shutdown.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_new_state_not_requested() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown_requested());
    }

    #[test]
    fn test_with_initial_true() {
        let state = ShutdownState::with_initial(true);
        assert!(state.is_shutdown_requested());
        // Already set, so this must not block.
        state.wait();
    }

    #[test]
    fn test_read_reflects_last_store() {
        let state = ShutdownState::new();
        for value in [true, false, false, true, true, false] {
            state.set_shutdown_requested(value);
            assert_eq!(state.is_shutdown_requested(), value);
        }
    }

    #[test]
    fn test_callbacks_run_once_per_transition_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();
        let state = ShutdownState::with_on_shutdown(vec![
            Box::new(move || first.lock().push("first")),
            Box::new(move || second.lock().push("second")),
        ]);

        state.set_shutdown_requested(false);
        assert!(order.lock().is_empty());

        state.set_shutdown_requested(true);
        state.set_shutdown_requested(true);
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_callbacks_see_flag_already_set() {
        let seen = Arc::new(AtomicBool::new(false));
        let state = Arc::new_cyclic(|weak: &std::sync::Weak<ShutdownState>| {
            let weak = weak.clone();
            let seen = seen.clone();
            ShutdownState::with_on_shutdown(vec![Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    seen.store(state.is_shutdown_requested(), Ordering::SeqCst);
                }
            })])
        });
        state.set_shutdown_requested(true);
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn test_set_true_wakes_all_waiters() {
        let state = Arc::new(ShutdownState::new());
        let woken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let woken = woken.clone();
                thread::spawn(move || {
                    state.wait();
                    woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        state.set_shutdown_requested(true);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_wait_timeout_expires_when_not_requested() {
        let state = ShutdownState::new();
        let start = Instant::now();
        assert!(!state.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_timeout_returns_early_on_request() {
        let state = Arc::new(ShutdownState::new());
        let setter = state.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set_shutdown_requested(true);
        });

        let start = Instant::now();
        assert!(state.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_with_huge_timeout_when_already_set() {
        let state = ShutdownState::with_initial(true);
        assert!(state.wait_timeout(Duration::MAX));
    }

    #[test]
    fn test_wait_timeout_with_huge_timeout_waits_for_request() {
        let state = Arc::new(ShutdownState::new());
        let waiter = {
            let state = state.clone();
            thread::spawn(move || state.wait_timeout(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        state.set_shutdown_requested(true);
        assert!(waiter.join().unwrap());
    }

    #[tokio::test]
    async fn test_wait_async_wakes_all_tasks() {
        let state = Arc::new(ShutdownState::new());
        let mut waiters = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let state = state.clone();
            waiters.spawn(async move { state.wait_async().await });
        }

        tokio::task::yield_now().await;
        state.set_shutdown_requested(true);

        let mut finished = 0;
        while let Some(res) = waiters.join_next().await {
            res.unwrap();
            finished += 1;
        }
        assert_eq!(finished, 4);
    }

    #[tokio::test]
    async fn test_wait_async_returns_when_already_set() {
        let state = ShutdownState::with_initial(true);
        tokio::time::timeout(Duration::from_secs(1), state.wait_async())
            .await
            .expect("wait_async should resolve immediately");
    }

    #[test]
    fn test_track_task_lifecycle() {
        let state = ShutdownState::new();
        let worker = state.track_task("worker");
        assert_eq!(state.live_tasks(), vec!["worker".to_string()]);
        drop(worker);
        assert!(state.live_tasks().is_empty());
    }
}
