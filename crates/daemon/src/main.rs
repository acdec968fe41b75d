//! Shutdown monitor daemon entry point.
//!
//! Runs a heartbeat scheduler under a configured shutdown monitor and offers
//! operator commands to request a stop through the sentinel file.

mod logging;
mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use shutdown_monitor_core::config::AppConfig;
use shutdown_monitor_core::{SentinelFile, StdProcessExit};

use crate::logging::{init_tracing, FlushThenExit, LogFlush};
use crate::scheduler::Scheduler;

/// How long the main task gives the scheduler to stop after shutdown is requested.
const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Long-running heartbeat daemon with graceful shutdown.
#[derive(Parser, Debug)]
#[command(name = "shutdown-monitor-daemon", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(short, long, default_value = "shutdown-monitor.toml")]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon until shutdown is requested.
    Run,

    /// Request shutdown of a running daemon by creating the sentinel file.
    Stop,

    /// Report whether the sentinel file is present.
    Status,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    let logs = init_tracing(log_level, config.daemon.log_dir.as_deref())?;

    let result = match cli.command {
        Commands::Run => cmd_run(&config, &logs).await,
        Commands::Stop => cmd_stop(&config),
        Commands::Status => cmd_status(&config),
    };
    logs.flush();
    result
}

/// Load and validate the config, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        AppConfig::load_from_file(path).context("failed to load configuration file")?
    } else {
        AppConfig::default()
    };
    config
        .validate()
        .context("configuration validation failed")?;
    Ok(config)
}

/// Run the heartbeat scheduler until shutdown is requested.
async fn cmd_run(config: &AppConfig, logs: &LogFlush<WorkerGuard>) -> Result<()> {
    info!("========================================");
    info!("  Shutdown Monitor Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Heartbeat     : {}s", config.daemon.heartbeat_interval_secs);
    info!("Sentinel file : {}", config.shutdown.sentinel_path.display());
    info!(
        "File watch    : {}",
        config
            .shutdown
            .file_watch
            .as_ref()
            .map(|w| format!("every {}s on '{}'", w.check_interval_secs, w.thread_name))
            .unwrap_or_else(|| "disabled".into())
    );
    info!("Signal hook   : {}", config.shutdown.register_termination_hook);
    info!("========================================");

    // Built on the main thread: the watcher and the hook wait for it. Either
    // may end the process once `finish` runs, so it flushes the log file first.
    let monitor = config
        .shutdown
        .to_builder()
        .process_exit(Arc::new(FlushThenExit::new(
            logs.clone(),
            Arc::new(StdProcessExit),
        )))
        .build();

    let state = monitor.state();
    let scheduler = Scheduler::new(
        state.clone(),
        Duration::from_secs(config.daemon.heartbeat_interval_secs),
    );
    let stats = scheduler.stats();
    let scheduler_handle = tokio::spawn(async move {
        let _task = state.track_task("heartbeat-scheduler");
        scheduler.run().await;
    });

    monitor.wait_async().await;
    info!("Shutdown requested, stopping...");

    match tokio::time::timeout(SCHEDULER_STOP_TIMEOUT, scheduler_handle).await {
        Ok(Ok(())) => info!("scheduler stopped gracefully"),
        Ok(Err(e)) => warn!("scheduler task error: {}", e),
        Err(_) => warn!(
            "scheduler did not stop within {}s",
            SCHEDULER_STOP_TIMEOUT.as_secs()
        ),
    }

    info!(cycles = stats.cycles(), "Shutdown monitor daemon stopped.");
    monitor.finish();
    Ok(())
}

/// Create the sentinel file so a running daemon begins its shutdown.
fn cmd_stop(config: &AppConfig) -> Result<()> {
    let sentinel = SentinelFile::new(&config.shutdown.sentinel_path);
    println!("{}", request_stop(&sentinel)?);
    Ok(())
}

/// Show whether a shutdown request is pending.
fn cmd_status(config: &AppConfig) -> Result<()> {
    let sentinel = SentinelFile::new(&config.shutdown.sentinel_path);
    println!("{}", status_line(&sentinel));
    Ok(())
}

fn request_stop(sentinel: &SentinelFile) -> Result<String> {
    let created = sentinel
        .create_if_absent()
        .context("failed to request shutdown")?;
    Ok(if created {
        format!("✓ Shutdown requested ({})", sentinel.path().display())
    } else {
        format!(
            "Shutdown already requested ({} exists)",
            sentinel.path().display()
        )
    })
}

fn status_line(sentinel: &SentinelFile) -> String {
    if sentinel.exists() {
        format!("● Shutdown requested ({})", sentinel.path().display())
    } else {
        "○ No shutdown requested".to_string()
    }
}
