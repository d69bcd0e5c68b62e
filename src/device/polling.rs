//! Queue-depth polling for printers that give no per-job events: the job counts as done
//! once the printer's queue is empty.

use crate::device::{DeviceError, JobHandle};
use crate::scheduler::{JobOutcome, JobWatcher};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

#[async_trait]
pub trait QueueProbe: Send + Sync {
    /// Number of jobs the printer still holds.
    async fn queued_jobs(&self) -> Result<usize, DeviceError>;
}

pub struct PollingJob {
    probe: Arc<dyn QueueProbe>,
    interval: Duration,
}

impl PollingJob {
    pub fn new(probe: Arc<dyn QueueProbe>, interval: Duration) -> Self {
        Self { probe, interval }
    }
}

impl JobHandle for PollingJob {
    /// Spawns the poller on the current runtime. It stops once the watcher has an outcome,
    /// including one signalled by someone else.
    fn watch(self: Box<Self>, watcher: JobWatcher) {
        let PollingJob { probe, interval } = *self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if watcher.is_done() {
                    break;
                }
                match probe.queued_jobs().await {
                    Ok(0) => {
                        watcher.signal_done(JobOutcome::Completed);
                        break;
                    }
                    Ok(count) => tracing::debug!("Current queued job count: {}", count),
                    Err(e) => tracing::warn!("Could not read printer queue: {}", e),
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports `remaining` jobs, one fewer on every poll.
    struct Draining {
        remaining: AtomicUsize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl QueueProbe for Draining {
        async fn queued_jobs(&self) -> Result<usize, DeviceError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let now = self.remaining.load(Ordering::SeqCst);
            if now > 0 {
                self.remaining.store(now - 1, Ordering::SeqCst);
            }
            Ok(now)
        }
    }

    #[tokio::test]
    async fn test_completes_when_queue_empties() {
        let probe = Arc::new(Draining {
            remaining: AtomicUsize::new(2),
            polls: AtomicUsize::new(0),
        });
        let watcher = JobWatcher::new();
        Box::new(PollingJob::new(probe.clone(), Duration::from_millis(5))).watch(watcher.clone());
        let report = watcher.wait().await.unwrap();
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(probe.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_polling_after_outside_signal() {
        let probe = Arc::new(Draining {
            remaining: AtomicUsize::new(usize::MAX),
            polls: AtomicUsize::new(0),
        });
        let watcher = JobWatcher::new();
        Box::new(PollingJob::new(probe.clone(), Duration::from_millis(5))).watch(watcher.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        watcher.signal_done(JobOutcome::Cancelled);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let polls = probe.polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(probe.polls.load(Ordering::SeqCst), polls);
    }
}
