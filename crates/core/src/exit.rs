//! Process termination capability.
//!
//! The file watcher and the termination hook end the process once graceful
//! teardown is over. They do so through [`ProcessExit`] so that tests can
//! observe the exit instead of losing the test process.

/// Terminates the process with a status code.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Calls [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}
