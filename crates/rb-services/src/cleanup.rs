//! # Cleanup Scheduler
//!
//! Periodically purges expired comments. One sweep at a time: a tick that
//! fires while the previous sweep is still running is skipped. Failures are
//! logged and retried on the next tick; they never stop the timer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::board::BoardService;

/// Default sweep period.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Something that can remove expired rows in one pass.
#[async_trait]
pub trait Sweeper: Send + Sync + 'static {
    async fn sweep(&self) -> anyhow::Result<u64>;
}

#[async_trait]
impl Sweeper for BoardService {
    async fn sweep(&self) -> anyhow::Result<u64> {
        Ok(self.expire_comments().await?)
    }
}

pub struct CleanupScheduler<S> {
    sweeper: Arc<S>,
    period: Duration,
    // Single-slot token: whoever holds the permit is the running sweep.
    slot: Arc<Semaphore>,
}

impl<S: Sweeper> CleanupScheduler<S> {
    pub fn new(sweeper: Arc<S>, period: Duration) -> Self {
        Self {
            sweeper,
            period,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Runs until `shutdown` is cancelled, then waits for an in-flight sweep.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) {
        // First sweep one full period after start.
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = self.period.as_secs(), "comment sweeper started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick(),
            }
        }

        let _ = self.slot.acquire().await;
        info!("comment sweeper stopped");
    }

    fn tick(&self) {
        let Ok(permit) = Arc::clone(&self.slot).try_acquire_owned() else {
            debug!("previous sweep still running; skipping tick");
            return;
        };

        let sweeper = Arc::clone(&self.sweeper);
        tokio::spawn(async move {
            let _permit = permit;
            match sweeper.sweep().await {
                Ok(removed) => debug!(removed, "comment sweep finished"),
                Err(e) => warn!(error = %format!("{e:#}"), "comment sweep failed; retrying next tick"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct SlowSweeper {
        started: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        finished: AtomicBool,
    }

    #[async_trait]
    impl Sweeper for SlowSweeper {
        async fn sweep(&self) -> anyhow::Result<u64> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now_running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(150)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.finished.store(true, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[derive(Default)]
    struct FailingSweeper {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Sweeper for FailingSweeper {
        async fn sweep(&self) -> anyhow::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("database is locked")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_skipped() {
        let sweeper = Arc::new(SlowSweeper::default());
        let shutdown = CancellationToken::new();
        let task = CleanupScheduler::new(sweeper.clone(), Duration::from_secs(60)).spawn(shutdown.clone());

        // Ticks at 60, 120, ..., 420; each sweep takes 150s.
        tokio::time::sleep(Duration::from_secs(430)).await;

        let started = sweeper.started.load(Ordering::SeqCst);
        assert_eq!(sweeper.max_running.load(Ordering::SeqCst), 1);
        assert!(started >= 2, "sweeps started: {started}");
        assert!(started < 7, "every tick ran a sweep: {started}");

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_timer() {
        let sweeper = Arc::new(FailingSweeper::default());
        let shutdown = CancellationToken::new();
        let task = CleanupScheduler::new(sweeper.clone(), Duration::from_secs(60)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(190)).await;
        assert!(sweeper.calls.load(Ordering::SeqCst) >= 3);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_sweep() {
        let sweeper = Arc::new(SlowSweeper::default());
        let shutdown = CancellationToken::new();
        let task = CleanupScheduler::new(sweeper.clone(), Duration::from_secs(60)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(sweeper.started.load(Ordering::SeqCst), 1);
        assert!(!sweeper.finished.load(Ordering::SeqCst));

        shutdown.cancel();
        task.await.unwrap();
        assert!(sweeper.finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_tick_runs_nothing() {
        let sweeper = Arc::new(SlowSweeper::default());
        let shutdown = CancellationToken::new();
        let task = CleanupScheduler::new(sweeper.clone(), DEFAULT_CLEANUP_INTERVAL).spawn(shutdown.clone());

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(sweeper.started.load(Ordering::SeqCst), 0);
    }
}
