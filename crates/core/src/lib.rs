//! Shutdown monitor core library.
//!
//! A process-wide graceful-shutdown flag for long-running applications. Any
//! thread can request shutdown or wait for it. Optional sources feed the
//! flag: a sentinel file watched on a background thread and an OS
//! termination signal hook. Both wait for the application's main task to
//! finish before the process exits.

pub mod config;
pub mod errors;
pub mod exit;
pub mod hook;
pub mod main_task;
pub mod monitor;
pub mod sentinel;
pub mod state;
pub mod tracker;
pub mod watcher;

// Re-exports for convenience.
pub use config::AppConfig;
pub use exit::{ProcessExit, StdProcessExit};
pub use monitor::{ShutdownMonitor, ShutdownMonitorBuilder};
pub use sentinel::SentinelFile;
pub use state::ShutdownState;
