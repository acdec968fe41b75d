//! Delivers a real SIGTERM to the test process.
//!
//! Kept in its own test binary so the signal cannot reach hooks installed by
//! other tests.

#![cfg(unix)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use shutdown_monitor_core::{ProcessExit, ShutdownMonitor};

#[derive(Default)]
struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().push(code);
    }
}

#[test]
fn test_sigterm_sets_flag_and_exits_after_main_task() {
    let exit = Arc::new(RecordingExit::default());
    let monitor = ShutdownMonitor::builder()
        .register_shutdown_hook()
        .process_exit(exit.clone())
        .build();
    let hook = monitor.termination_hook().expect("hook should be installed");

    // SAFETY: a tokio handler for SIGTERM is registered, so raising it does
    // not terminate the test process.
    let rc = unsafe { libc::raise(libc::SIGTERM) };
    assert_eq!(rc, 0);

    assert!(monitor.wait_timeout(Duration::from_secs(5)));
    assert!(hook.has_fired());

    thread::sleep(Duration::from_millis(50));
    assert!(exit.codes.lock().is_empty());

    monitor.finish();

    let deadline = Instant::now() + Duration::from_secs(5);
    while exit.codes.lock().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(*exit.codes.lock(), vec![0]);
}
