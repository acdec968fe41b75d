//! Tracing setup and log flushing at process exit.
//!
//! The optional log file is written through a non-blocking appender whose
//! buffered lines are only flushed when its [`WorkerGuard`] drops.
//! `std::process::exit` skips destructors, so the exit used by the shutdown
//! monitor drops the guard first.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use shutdown_monitor_core::ProcessExit;

/// Install the stdout subscriber and, when configured, a daily rolling file.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Result<LogFlush<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "shutdown-monitor-daemon.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(file_layer)
        .init();
    Ok(LogFlush::new(guard))
}

/// Shared owner of the log writer guard. The first [`flush`](Self::flush)
/// drops it; later calls do nothing.
pub struct LogFlush<G> {
    guard: Arc<Mutex<Option<G>>>,
}

impl<G> Clone for LogFlush<G> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
        }
    }
}

impl<G> LogFlush<G> {
    pub fn new(guard: Option<G>) -> Self {
        Self {
            guard: Arc::new(Mutex::new(guard)),
        }
    }

    pub fn flush(&self) {
        // The lock is held until the guard has dropped, so a concurrent
        // flush (and the exit behind it) waits for the writer to drain.
        let mut slot = self.guard.lock();
        drop(slot.take());
    }
}

/// Flushes the log file, then ends the process through `exit`.
pub struct FlushThenExit<G> {
    logs: LogFlush<G>,
    exit: Arc<dyn ProcessExit>,
}

impl<G> FlushThenExit<G> {
    pub fn new(logs: LogFlush<G>, exit: Arc<dyn ProcessExit>) -> Self {
        Self { logs, exit }
    }
}

impl<G: Send> ProcessExit for FlushThenExit<G> {
    fn exit(&self, code: i32) {
        self.logs.flush();
        self.exit.exit(code);
    }
}
