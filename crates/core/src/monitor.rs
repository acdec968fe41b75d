//! Builder that wires a [`ShutdownState`] to its optional sources.
//!
//! ```no_run
//! use shutdown_monitor_core::ShutdownMonitor;
//!
//! let monitor = ShutdownMonitor::builder()
//!     .create_file_when_shutdown_requested()
//!     .listen_for_shutdown_file("shutdown-watcher")
//!     .register_shutdown_hook()
//!     .build();
//!
//! while !monitor.is_shutdown_requested() {
//!     // do work
//! #   break;
//! }
//! // Dropping the monitor tells the watcher and the hook that the main
//! // task has finished.
//! drop(monitor);
//! ```
//!
//! `build()` must be called on the task that is the application's main
//! task: both background sources wait for that task to finish before the
//! process exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, warn};

use crate::exit::{ProcessExit, StdProcessExit};
use crate::hook::TerminationSignalSource;
use crate::main_task::{MainTask, MainTaskGuard};
use crate::sentinel::{SentinelFile, DEFAULT_SENTINEL};
use crate::state::{OnShutdown, ShutdownState};
use crate::tracker::TrackedTask;
use crate::watcher::{FilePresenceSource, DEFAULT_CHECK_INTERVAL};

#[derive(Debug, Clone)]
struct FileWatch {
    thread_name: String,
    check_interval: Duration,
}

#[derive(Debug)]
struct RunningWatch {
    handle: JoinHandle<()>,
    check_interval: Duration,
}

/// Configures and builds a [`ShutdownMonitor`].
pub struct ShutdownMonitorBuilder {
    create_file_on_shutdown: bool,
    file_watch: Option<FileWatch>,
    register_shutdown_hook: bool,
    sentinel_path: PathBuf,
    main_task_timeout: Option<Duration>,
    exit: Arc<dyn ProcessExit>,
}

impl Default for ShutdownMonitorBuilder {
    fn default() -> Self {
        Self {
            create_file_on_shutdown: false,
            file_watch: None,
            register_shutdown_hook: false,
            sentinel_path: PathBuf::from(DEFAULT_SENTINEL),
            main_task_timeout: None,
            exit: Arc::new(StdProcessExit),
        }
    }
}

impl ShutdownMonitorBuilder {
    /// Create the sentinel file when shutdown is requested, by any source.
    pub fn create_file_when_shutdown_requested(mut self) -> Self {
        self.create_file_on_shutdown = true;
        self
    }

    /// Watch for the sentinel file on a background thread, checking every
    /// 10 seconds.
    pub fn listen_for_shutdown_file(self, thread_name: impl Into<String>) -> Self {
        self.listen_for_shutdown_file_every(thread_name, DEFAULT_CHECK_INTERVAL)
    }

    /// Watch for the sentinel file on a background thread, checking every
    /// `check_interval`.
    pub fn listen_for_shutdown_file_every(
        mut self,
        thread_name: impl Into<String>,
        check_interval: Duration,
    ) -> Self {
        self.file_watch = Some(FileWatch {
            thread_name: thread_name.into(),
            check_interval,
        });
        self
    }

    /// Install the OS termination signal hook.
    pub fn register_shutdown_hook(mut self) -> Self {
        self.register_shutdown_hook = true;
        self
    }

    /// Use a sentinel file other than `./shutdown`.
    pub fn sentinel_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sentinel_path = path.into();
        self
    }

    /// Bound how long the watcher and the hook wait for the main task.
    ///
    /// By default they wait indefinitely.
    pub fn main_task_timeout(mut self, timeout: Duration) -> Self {
        self.main_task_timeout = Some(timeout);
        self
    }

    /// Replace the process exit used by the watcher and the hook.
    pub fn process_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    /// Build the monitor, capturing the calling thread as the main task and
    /// starting the configured sources.
    ///
    /// A source that cannot be started is logged and left out; the flag
    /// itself always works.
    pub fn build(self) -> ShutdownMonitor {
        let sentinel = SentinelFile::new(&self.sentinel_path);

        let mut on_shutdown: Vec<OnShutdown> = Vec::new();
        if self.create_file_on_shutdown {
            let sentinel = sentinel.clone();
            on_shutdown.push(Box::new(move || sentinel.ensure_created()));
        }
        let state = Arc::new(ShutdownState::with_on_shutdown(on_shutdown));
        let (main, guard) = MainTask::current();

        let watcher = self.file_watch.and_then(|watch| {
            let check_interval = if watch.check_interval.is_zero() {
                warn!(
                    default_secs = DEFAULT_CHECK_INTERVAL.as_secs(),
                    "shutdown file check interval is zero, using default"
                );
                DEFAULT_CHECK_INTERVAL
            } else {
                watch.check_interval
            };

            FilePresenceSource::new(state.clone(), sentinel, main.clone(), self.exit.clone())
                .check_interval(check_interval)
                .main_task_timeout(self.main_task_timeout)
                .spawn(&watch.thread_name)
                .map(|handle| RunningWatch {
                    handle,
                    check_interval,
                })
                .map_err(|e| {
                    error!(thread = %watch.thread_name, error = %e, "failed to start shutdown file watcher")
                })
                .ok()
        });

        let hook = if self.register_shutdown_hook {
            let hook = TerminationSignalSource::new(state.clone(), main, self.main_task_timeout);
            match hook.install(self.exit.clone()) {
                Ok(_) => Some(hook),
                Err(e) => {
                    error!(error = %e, "failed to register termination hook");
                    None
                }
            }
        } else {
            None
        };

        ShutdownMonitor {
            state,
            watcher,
            hook,
            _main: guard,
        }
    }
}

/// A configured shutdown flag owned by the application's main task.
///
/// Dropping the monitor (or calling [`finish`](Self::finish)) marks the main
/// task complete. Hand [`state`](Self::state) to any other task that needs to
/// observe or request shutdown.
pub struct ShutdownMonitor {
    state: Arc<ShutdownState>,
    watcher: Option<RunningWatch>,
    hook: Option<TerminationSignalSource>,
    _main: MainTaskGuard,
}

impl ShutdownMonitor {
    pub fn builder() -> ShutdownMonitorBuilder {
        ShutdownMonitorBuilder::default()
    }

    /// Shared flag for other tasks.
    pub fn state(&self) -> Arc<ShutdownState> {
        self.state.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.state.is_shutdown_requested()
    }

    pub fn set_shutdown_requested(&self, value: bool) {
        self.state.set_shutdown_requested(value);
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        self.state.wait();
    }

    /// Block until shutdown is requested or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.state.wait_timeout(timeout)
    }

    pub async fn wait_async(&self) {
        self.state.wait_async().await;
    }

    /// See [`ShutdownState::track_task`].
    pub fn track_task(&self, name: impl Into<String>) -> TrackedTask {
        self.state.track_task(name)
    }

    /// Whether the file watcher thread is running.
    pub fn is_watching_file(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    /// Interval the file watcher polls at, after a zero interval has been
    /// replaced with the default. `None` when no watcher was started.
    pub fn file_check_interval(&self) -> Option<Duration> {
        self.watcher.as_ref().map(|w| w.check_interval)
    }

    /// The installed termination hook, if any. Calling
    /// [`TerminationSignalSource::fire`] simulates a termination request.
    pub fn termination_hook(&self) -> Option<TerminationSignalSource> {
        self.hook.clone()
    }

    /// Mark the main task complete.
    pub fn finish(self) {}
}

impl std::fmt::Debug for ShutdownMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownMonitor")
            .field("state", &self.state)
            .field("watching_file", &self.is_watching_file())
            .field("termination_hook", &self.hook.is_some())
            .finish()
    }
}
