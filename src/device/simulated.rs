//! In-process printer with scripted outcomes. Used by the tests and the `print_sim` binary.

use crate::device::{DeviceError, DeviceGateway, JobHandle, JobNotifier, RenderedDocument, callback_job};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What the simulated printer does with the next submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedOutcome {
    Complete,
    Fail,
    Cancel,
    /// `submit` returns `DeviceError::Rejected`.
    Reject,
    /// `submit` returns `DeviceError::Unavailable`.
    Unavailable,
    /// The job never finishes until [`SimulatedPrinter::release_hung`] is called.
    Hang,
}

impl FromStr for SimulatedOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" | "complete" => Ok(SimulatedOutcome::Complete),
            "fail" => Ok(SimulatedOutcome::Fail),
            "cancel" => Ok(SimulatedOutcome::Cancel),
            "reject" => Ok(SimulatedOutcome::Reject),
            "unavailable" => Ok(SimulatedOutcome::Unavailable),
            "hang" => Ok(SimulatedOutcome::Hang),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Parse a comma-separated script such as `ok,fail,ok`.
pub fn parse_script(script: &str) -> Result<Vec<SimulatedOutcome>, String> {
    script
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

#[derive(Default)]
struct Counters {
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
}

impl Counters {
    fn begin(&self) {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(now, Ordering::SeqCst);
    }

    fn end(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SimulatedPrinter {
    name: String,
    latency: Duration,
    failure_rate: f64,
    script: Mutex<VecDeque<SimulatedOutcome>>,
    submitted: Mutex<Vec<RenderedDocument>>,
    hung: Mutex<Vec<JobNotifier>>,
    counters: Arc<Counters>,
}

impl SimulatedPrinter {
    /// Completes every job after `latency`.
    pub fn new(name: &str, latency: Duration) -> Self {
        Self {
            name: name.to_string(),
            latency,
            failure_rate: 0.0,
            script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            hung: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Outcomes for the next submissions, in order. Once used up, jobs complete.
    pub fn with_script(self, script: impl IntoIterator<Item = SimulatedOutcome>) -> Self {
        self.script.lock().extend(script);
        self
    }

    /// Probability that an unscripted job fails.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Titles of every document submitted so far, in order.
    pub fn submitted_titles(&self) -> Vec<String> {
        self.submitted.lock().iter().map(|d| d.title.clone()).collect()
    }

    pub fn submitted(&self) -> Vec<RenderedDocument> {
        self.submitted.lock().clone()
    }

    pub fn outstanding(&self) -> usize {
        self.counters.outstanding.load(Ordering::SeqCst)
    }

    /// Most jobs that were ever in progress at once.
    pub fn max_outstanding(&self) -> usize {
        self.counters.max_outstanding.load(Ordering::SeqCst)
    }

    /// Complete every hung job. Returns how many there were.
    pub fn release_hung(&self) -> usize {
        let hung: Vec<JobNotifier> = self.hung.lock().drain(..).collect();
        let count = hung.len();
        for notifier in hung {
            self.counters.end();
            notifier.complete();
        }
        count
    }

    fn next_outcome(&self) -> SimulatedOutcome {
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            SimulatedOutcome::Fail
        } else {
            SimulatedOutcome::Complete
        }
    }
}

#[async_trait]
impl DeviceGateway for SimulatedPrinter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, document: RenderedDocument) -> Result<Box<dyn JobHandle>, DeviceError> {
        let outcome = self.next_outcome();
        tracing::debug!("Simulated printer '{}' got '{}' ({:?})", self.name, document.title, outcome);
        self.submitted.lock().push(document);

        match outcome {
            SimulatedOutcome::Reject => return Err(DeviceError::Rejected("simulated rejection".to_string())),
            SimulatedOutcome::Unavailable => {
                return Err(DeviceError::Unavailable(format!("{} is offline", self.name)));
            }
            _ => {}
        }

        let (job, notifier) = callback_job();
        self.counters.begin();
        if outcome == SimulatedOutcome::Hang {
            self.hung.lock().push(notifier);
            return Ok(Box::new(job));
        }

        let counters = self.counters.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            counters.end();
            match outcome {
                SimulatedOutcome::Fail => notifier.fail("simulated failure"),
                SimulatedOutcome::Cancel => notifier.cancel(),
                _ => notifier.complete(),
            }
        });
        Ok(Box::new(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        assert_eq!(
            parse_script("ok, fail,ok").unwrap(),
            vec![SimulatedOutcome::Complete, SimulatedOutcome::Fail, SimulatedOutcome::Complete]
        );
        assert!(parse_script("ok,jam").is_err());
        assert!(parse_script("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_recorded_but_not_outstanding() {
        let printer = SimulatedPrinter::new("sim", Duration::ZERO).with_script([SimulatedOutcome::Reject]);
        let doc = RenderedDocument {
            title: "a".to_string(),
            body: Vec::new(),
        };
        assert!(matches!(printer.submit(doc).await, Err(DeviceError::Rejected(_))));
        assert_eq!(printer.submitted_titles(), vec!["a"]);
        assert_eq!(printer.max_outstanding(), 0);
    }
}
