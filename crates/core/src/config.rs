//! TOML-based configuration for applications that host a shutdown monitor.
//!
//! The `[shutdown]` table maps one-to-one onto the
//! [`ShutdownMonitorBuilder`](crate::monitor::ShutdownMonitorBuilder)
//! toggles; the `[daemon]` table carries settings for the host process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::monitor::{ShutdownMonitor, ShutdownMonitorBuilder};
use crate::sentinel::DEFAULT_SENTINEL;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host process settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Shutdown monitor settings.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Host process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between heartbeat cycles (default 5).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for daily rolling log files. Logs go to stdout only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_heartbeat_interval() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Shutdown monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Create the sentinel file when shutdown is requested.
    #[serde(default)]
    pub create_file_on_shutdown: bool,

    /// Install the SIGTERM / SIGINT hook.
    #[serde(default)]
    pub register_termination_hook: bool,

    /// Sentinel file path (default `shutdown`, relative to the working directory).
    #[serde(default = "default_sentinel_path")]
    pub sentinel_path: PathBuf,

    /// Upper bound on waiting for the main task. Waits forever when unset.
    #[serde(default)]
    pub main_task_timeout_secs: Option<u64>,

    /// Poll for the sentinel file when present.
    #[serde(default)]
    pub file_watch: Option<FileWatchConfig>,
}

fn default_sentinel_path() -> PathBuf {
    PathBuf::from(DEFAULT_SENTINEL)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            create_file_on_shutdown: false,
            register_termination_hook: false,
            sentinel_path: default_sentinel_path(),
            main_task_timeout_secs: None,
            file_watch: None,
        }
    }
}

/// Sentinel file polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWatchConfig {
    /// Name of the watcher thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Seconds between checks (default 10).
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_thread_name() -> String {
    "shutdown-watcher".into()
}
fn default_check_interval() -> u64 {
    10
}

impl Default for FileWatchConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            check_interval_secs: default_check_interval(),
        }
    }
}

impl ShutdownConfig {
    /// Translate into builder toggles.
    pub fn to_builder(&self) -> ShutdownMonitorBuilder {
        let mut builder = ShutdownMonitor::builder().sentinel_path(&self.sentinel_path);
        if self.create_file_on_shutdown {
            builder = builder.create_file_when_shutdown_requested();
        }
        if let Some(watch) = &self.file_watch {
            builder = builder.listen_for_shutdown_file_every(
                watch.thread_name.clone(),
                Duration::from_secs(watch.check_interval_secs),
            );
        }
        if self.register_termination_hook {
            builder = builder.register_shutdown_hook();
        }
        if let Some(secs) = self.main_task_timeout_secs {
            builder = builder.main_task_timeout(Duration::from_secs(secs));
        }
        builder
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse an [`AppConfig`] from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!(?config, "parsed configuration");
        Ok(config)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.heartbeat_interval_secs == 0 {
            return Err(invalid(
                "daemon.heartbeat_interval_secs",
                "must be greater than zero",
            ));
        }
        if !LOG_LEVELS.contains(&self.daemon.log_level.as_str()) {
            return Err(invalid(
                "daemon.log_level",
                &format!(
                    "'{}' is not one of {}",
                    self.daemon.log_level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }
        if self.shutdown.sentinel_path.as_os_str().is_empty() {
            return Err(invalid("shutdown.sentinel_path", "must not be empty"));
        }
        if let Some(watch) = &self.shutdown.file_watch {
            if watch.thread_name.trim().is_empty() {
                return Err(invalid(
                    "shutdown.file_watch.thread_name",
                    "must not be empty",
                ));
            }
            if watch.check_interval_secs == 0 {
                return Err(invalid(
                    "shutdown.file_watch.check_interval_secs",
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}
