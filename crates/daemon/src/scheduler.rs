//! Heartbeat scheduler that runs cycles on a fixed interval until shutdown
//! is requested.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::info;

use shutdown_monitor_core::ShutdownState;

/// Tracks aggregate statistics across heartbeat cycles.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub total_cycles: AtomicU64,
}

impl SchedulerStats {
    pub fn cycles(&self) -> u64 {
        self.total_cycles.load(Ordering::SeqCst)
    }
}

/// The heartbeat scheduler.
///
/// Stops at the first shutdown request, including one that arrives while it
/// is waiting for the next tick.
pub struct Scheduler {
    state: Arc<ShutdownState>,
    interval: Duration,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(state: Arc<ShutdownState>, interval: Duration) -> Self {
        Self {
            state,
            interval,
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    /// Main scheduler loop. Returns once shutdown is requested.
    pub async fn run(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "scheduler started"
        );

        let mut interval = time::interval(self.interval);
        // The first tick fires immediately; consume it so the first cycle
        // runs one interval after startup.
        interval.tick().await;

        loop {
            if self.state.is_shutdown_requested() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => self.run_cycle(),
                _ = self.state.wait_async() => break,
            }
        }

        info!(cycles = self.stats.cycles(), "shutdown requested, scheduler stopped");
    }

    fn run_cycle(&self) {
        let cycle = self.stats.total_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(cycle, "heartbeat");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_runs_cycles_until_shutdown() {
        let state = Arc::new(ShutdownState::new());
        let scheduler = Scheduler::new(state.clone(), Duration::from_secs(5));
        let stats = scheduler.stats();

        let handle = tokio::spawn(async move { scheduler.run().await });

        time::sleep(Duration::from_secs(12)).await;
        assert_eq!(stats.cycles(), 2);

        state.set_shutdown_requested(true);
        handle.await.unwrap();
        assert_eq!(stats.cycles(), 2);
    }

    #[tokio::test]
    async fn test_returns_immediately_when_already_requested() {
        let state = Arc::new(ShutdownState::with_initial(true));
        let scheduler = Scheduler::new(state, Duration::from_secs(3600));

        time::timeout(Duration::from_secs(5), scheduler.run())
            .await
            .expect("scheduler should stop at once");
        assert_eq!(scheduler.stats().cycles(), 0);
    }
}
