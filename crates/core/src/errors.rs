//! Error types for the shutdown monitor core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`MonitorError`] enum unifies them for callers that want a
//! single error type. None of these ever escape the flag API itself:
//! `set_shutdown_requested` and `is_shutdown_requested` are infallible.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Sentinel(#[from] SentinelError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Sentinel file errors
// ---------------------------------------------------------------------------

/// Errors from creating the sentinel file.
#[derive(Debug, Error)]
pub enum SentinelError {
    /// The file could not be created or written.
    #[error("failed to create sentinel file '{}': {source}", .path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Termination hook errors
// ---------------------------------------------------------------------------

/// Errors from installing the OS termination hook.
#[derive(Debug, Error)]
pub enum HookError {
    /// The runtime that drives signal delivery could not be started.
    #[error("failed to start signal runtime: {0}")]
    RuntimeFailed(#[source] std::io::Error),

    /// A signal handler could not be registered.
    #[error("failed to register {signal} handler: {source}")]
    SignalRegistration {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The hook thread could not be spawned.
    #[error("failed to spawn termination hook thread: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The hook thread ended before reporting whether setup succeeded.
    #[error("termination hook thread exited during setup")]
    SetupAborted,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
