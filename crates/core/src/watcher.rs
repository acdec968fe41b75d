//! Background watcher that turns the sentinel file into a shutdown request.
//!
//! The watcher polls for the sentinel file on a fixed interval. As soon as
//! the file exists, or the shared flag was set by some other source, it:
//!
//! 1. sets the flag (idempotent),
//! 2. waits for the main task to finish,
//! 3. warns about tracked tasks that are still running,
//! 4. exits the process with status 0.
//!
//! Between polls it waits on the flag itself, so a request from another
//! source is picked up immediately rather than at the next interval.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, trace, warn};

use crate::exit::ProcessExit;
use crate::main_task::MainTask;
use crate::sentinel::SentinelFile;
use crate::state::ShutdownState;

/// Default time between sentinel file checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// What caused the watcher to start the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    SentinelFile,
    FlagAlreadySet,
}

/// Polls for the sentinel file and finalizes shutdown.
pub struct FilePresenceSource {
    state: Arc<ShutdownState>,
    sentinel: SentinelFile,
    main: MainTask,
    check_interval: Duration,
    main_task_timeout: Option<Duration>,
    exit: Arc<dyn ProcessExit>,
}

impl FilePresenceSource {
    pub fn new(
        state: Arc<ShutdownState>,
        sentinel: SentinelFile,
        main: MainTask,
        exit: Arc<dyn ProcessExit>,
    ) -> Self {
        Self {
            state,
            sentinel,
            main,
            check_interval: DEFAULT_CHECK_INTERVAL,
            main_task_timeout: None,
            exit,
        }
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Give up waiting for the main task after `timeout`. `None` waits forever.
    pub fn main_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.main_task_timeout = timeout;
        self
    }

    /// Run the watcher on a new named thread.
    pub fn spawn(self, thread_name: &str) -> io::Result<JoinHandle<()>> {
        info!(
            thread = thread_name,
            path = %self.sentinel.path().display(),
            interval = ?self.check_interval,
            "listening for shutdown file"
        );
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || self.run())
    }

    /// Run the watcher on the current thread until the process exit step.
    pub fn run(self) {
        let trigger = self.wait_for_trigger();
        self.state.set_shutdown_requested(true);
        match trigger {
            Trigger::SentinelFile => {
                info!(path = %self.sentinel.path().display(), "shutdown file detected - initiating graceful shutdown")
            }
            Trigger::FlagAlreadySet => {
                info!("shutdown already requested - initiating graceful shutdown")
            }
        }

        if self.main.wait(self.main_task_timeout) {
            for task in self.state.live_tasks() {
                warn!(task = %task, "shutting down with still running task");
            }
        } else {
            error!(
                main = self.main.name(),
                "timed out waiting for main task to finish"
            );
        }

        info!("finishing shutdown file watcher, exiting");
        self.exit.exit(0);
    }

    fn wait_for_trigger(&self) -> Trigger {
        loop {
            if self.sentinel.exists() {
                return Trigger::SentinelFile;
            }
            if self.state.is_shutdown_requested() {
                return Trigger::FlagAlreadySet;
            }
            trace!(path = %self.sentinel.path().display(), "shutdown file not seen");
            self.state.wait_timeout(self.check_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingExit {
        codes: Mutex<Vec<i32>>,
    }

    impl ProcessExit for RecordingExit {
        fn exit(&self, code: i32) {
            self.codes.lock().push(code);
        }
    }

    fn watcher(
        dir: &TempDir,
        state: &Arc<ShutdownState>,
        main: MainTask,
        exit: &Arc<RecordingExit>,
    ) -> FilePresenceSource {
        FilePresenceSource::new(
            state.clone(),
            SentinelFile::new(dir.path().join("shutdown")),
            main,
            exit.clone(),
        )
        .check_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_sentinel_file_triggers_shutdown_and_exit() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ShutdownState::new());
        let exit = Arc::new(RecordingExit::default());
        let (main, guard) = MainTask::named("main");

        let handle = watcher(&dir, &state, main, &exit).spawn("watcher").unwrap();

        std::fs::write(dir.path().join("shutdown"), "\n").unwrap();
        assert!(state.wait_timeout(Duration::from_secs(5)));

        // Exit must wait for the main task.
        std::thread::sleep(Duration::from_millis(30));
        assert!(exit.codes.lock().is_empty());

        drop(guard);
        handle.join().unwrap();
        assert_eq!(*exit.codes.lock(), vec![0]);
    }

    #[test]
    fn test_flag_set_elsewhere_wakes_watcher_early() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ShutdownState::new());
        let exit = Arc::new(RecordingExit::default());
        let (main, guard) = MainTask::named("main");
        drop(guard);

        let handle = FilePresenceSource::new(
            state.clone(),
            SentinelFile::new(dir.path().join("shutdown")),
            main,
            exit.clone(),
        )
        .check_interval(Duration::from_secs(3600))
        .spawn("watcher")
        .unwrap();

        let start = Instant::now();
        state.set_shutdown_requested(true);
        handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(*exit.codes.lock(), vec![0]);
        // The watcher only observes the sentinel; it never creates it.
        assert!(!dir.path().join("shutdown").exists());
    }

    #[test]
    fn test_unbounded_interval_waits_for_flag() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ShutdownState::new());
        let exit = Arc::new(RecordingExit::default());
        let (main, guard) = MainTask::named("main");
        drop(guard);

        let handle = watcher(&dir, &state, main, &exit)
            .check_interval(Duration::MAX)
            .spawn("watcher")
            .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());
        assert!(exit.codes.lock().is_empty());

        state.set_shutdown_requested(true);
        handle.join().unwrap();
        assert_eq!(*exit.codes.lock(), vec![0]);
    }

    #[test]
    fn test_wait_for_trigger_reports_source() {
        let dir = TempDir::new().unwrap();
        let exit = Arc::new(RecordingExit::default());
        let (main, _guard) = MainTask::named("main");

        let state = Arc::new(ShutdownState::with_initial(true));
        let source = watcher(&dir, &state, main.clone(), &exit);
        assert_eq!(source.wait_for_trigger(), Trigger::FlagAlreadySet);

        std::fs::write(dir.path().join("shutdown"), "\n").unwrap();
        let state = Arc::new(ShutdownState::new());
        let source = watcher(&dir, &state, main, &exit);
        assert_eq!(source.wait_for_trigger(), Trigger::SentinelFile);
    }

    #[test]
    fn test_main_task_timeout_still_exits() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ShutdownState::with_initial(true));
        let exit = Arc::new(RecordingExit::default());
        let (main, _guard) = MainTask::named("main");

        watcher(&dir, &state, main, &exit)
            .main_task_timeout(Some(Duration::from_millis(20)))
            .run();

        assert_eq!(*exit.codes.lock(), vec![0]);
    }

    #[test]
    fn test_live_tasks_do_not_block_exit() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(ShutdownState::with_initial(true));
        let exit = Arc::new(RecordingExit::default());
        let (main, guard) = MainTask::named("main");
        let _straggler = state.track_task("straggler");
        drop(guard);

        watcher(&dir, &state, main, &exit).run();

        assert_eq!(*exit.codes.lock(), vec![0]);
        assert_eq!(state.live_tasks(), vec!["straggler".to_string()]);
    }
}
