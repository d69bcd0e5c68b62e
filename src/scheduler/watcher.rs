//! Job watcher: bridges a device's asynchronous completion to a single waiting worker.
//!
//! A `JobWatcher` is created right before a document is submitted and handed to the
//! device's [`JobHandle`](crate::device::JobHandle), which signals it from whichever
//! completion path fires. The first signal wins; later ones are ignored. A signal that
//! arrives before anyone waits is kept, so `wait` then returns immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::scheduler::SchedulerError;

/// How a submitted job ended, as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub outcome: JobOutcome,
    /// Milliseconds between watcher creation and the wait observing the signal.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct JobWatcher {
    inner: Arc<WatcherInner>,
}

#[derive(Debug)]
struct WatcherInner {
    started: Instant,
    done: watch::Sender<Option<JobOutcome>>,
}

impl JobWatcher {
    pub fn new() -> Self {
        let (done, _) = watch::channel(None);
        Self {
            inner: Arc::new(WatcherInner {
                started: Instant::now(),
                done,
            }),
        }
    }

    /// Record the job's outcome. Returns false if an outcome was already recorded.
    pub fn signal_done(&self, outcome: JobOutcome) -> bool {
        self.inner.done.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.borrow().is_some()
    }

    pub fn started_at(&self) -> Instant {
        self.inner.started
    }

    /// Block until the job has an outcome. There is no timeout.
    pub async fn wait(&self) -> Result<JobReport, SchedulerError> {
        let mut done = self.inner.done.subscribe();
        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SchedulerError::Interrupted)?
            .clone();
        match outcome {
            Some(outcome) => Ok(JobReport {
                outcome,
                elapsed_ms: self.elapsed_ms(),
            }),
            None => Err(SchedulerError::Interrupted),
        }
    }

    /// Like [`wait`](Self::wait), but fails with `Interrupted` if `interrupt` resolves first.
    pub async fn wait_or_interrupt<F>(&self, interrupt: F) -> Result<JobReport, SchedulerError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            report = self.wait() => report,
            _ = interrupt => {
                tracing::warn!("Job wait interrupted after {} ms", self.elapsed_ms());
                Err(SchedulerError::Interrupted)
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.inner.started.elapsed().as_millis() as u64
    }
}

impl Default for JobWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_before_wait_returns_immediately() {
        let watcher = JobWatcher::new();
        assert!(watcher.signal_done(JobOutcome::Completed));
        let report = tokio::time::timeout(Duration::from_millis(100), watcher.wait())
            .await
            .expect("wait should not block")
            .unwrap();
        assert_eq!(report.outcome, JobOutcome::Completed);
    }

    #[tokio::test]
    async fn test_first_signal_wins() {
        let watcher = JobWatcher::new();
        assert!(watcher.signal_done(JobOutcome::Failed("paper jam".into())));
        assert!(!watcher.signal_done(JobOutcome::Completed));
        assert!(!watcher.signal_done(JobOutcome::Cancelled));
        let report = watcher.wait().await.unwrap();
        assert_eq!(report.outcome, JobOutcome::Failed("paper jam".into()));
    }

    #[tokio::test]
    async fn test_wait_blocks_until_signalled_from_another_task() {
        let watcher = JobWatcher::new();
        let signaller = watcher.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            signaller.signal_done(JobOutcome::Completed);
        });
        assert!(!watcher.is_done());
        let report = watcher.wait().await.unwrap();
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert!(report.elapsed_ms >= 25);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_fails_the_wait() {
        let watcher = JobWatcher::new();
        let result = watcher
            .wait_or_interrupt(tokio::time::sleep(Duration::from_millis(10)))
            .await;
        assert!(matches!(result, Err(SchedulerError::Interrupted)));
        assert!(!watcher.is_done());
    }

    #[tokio::test]
    async fn test_completed_job_beats_pending_interrupt() {
        let watcher = JobWatcher::new();
        watcher.signal_done(JobOutcome::Cancelled);
        let result = watcher.wait_or_interrupt(std::future::pending()).await;
        assert_eq!(result.unwrap().outcome, JobOutcome::Cancelled);
    }
}
