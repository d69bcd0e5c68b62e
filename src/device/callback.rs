//! Callback-style job completion: the device fires exactly one of complete, failed or
//! cancelled through a [`JobNotifier`], and the [`CallbackJob`] runs whatever listeners were
//! registered for that event.

use crate::device::JobHandle;
use crate::scheduler::{JobOutcome, JobWatcher};
use parking_lot::Mutex;
use std::sync::Arc;

type Listener = Box<dyn FnOnce() + Send>;
type FailureListener = Box<dyn FnOnce(String) + Send>;

#[derive(Default)]
struct Listeners {
    fired: Option<JobOutcome>,
    on_complete: Vec<Listener>,
    on_failed: Vec<FailureListener>,
    on_cancelled: Vec<Listener>,
}

/// Create a connected job/notifier pair.
pub fn callback_job() -> (CallbackJob, JobNotifier) {
    let listeners = Arc::new(Mutex::new(Listeners::default()));
    (
        CallbackJob {
            listeners: listeners.clone(),
        },
        JobNotifier { listeners: Some(listeners) },
    )
}

pub struct CallbackJob {
    listeners: Arc<Mutex<Listeners>>,
}

impl CallbackJob {
    /// Listeners registered after the event has fired run straight away.
    pub fn on_complete(&self, listener: impl FnOnce() + Send + 'static) {
        let mut listeners = self.listeners.lock();
        match &listeners.fired {
            None => listeners.on_complete.push(Box::new(listener)),
            Some(JobOutcome::Completed) => {
                drop(listeners);
                listener();
            }
            Some(_) => {}
        }
    }

    pub fn on_failed(&self, listener: impl FnOnce(String) + Send + 'static) {
        let mut listeners = self.listeners.lock();
        match &listeners.fired {
            None => listeners.on_failed.push(Box::new(listener)),
            Some(JobOutcome::Failed(reason)) => {
                let reason = reason.clone();
                drop(listeners);
                listener(reason);
            }
            Some(_) => {}
        }
    }

    pub fn on_cancelled(&self, listener: impl FnOnce() + Send + 'static) {
        let mut listeners = self.listeners.lock();
        match &listeners.fired {
            None => listeners.on_cancelled.push(Box::new(listener)),
            Some(JobOutcome::Cancelled) => {
                drop(listeners);
                listener();
            }
            Some(_) => {}
        }
    }
}

impl JobHandle for CallbackJob {
    fn watch(self: Box<Self>, watcher: JobWatcher) {
        let w = watcher.clone();
        self.on_complete(move || {
            w.signal_done(JobOutcome::Completed);
        });
        let w = watcher.clone();
        self.on_failed(move |reason| {
            w.signal_done(JobOutcome::Failed(reason));
        });
        self.on_cancelled(move || {
            watcher.signal_done(JobOutcome::Cancelled);
        });
    }
}

/// Device side of a [`CallbackJob`]. Firing consumes the notifier; dropping it unfired
/// reports the job as failed.
pub struct JobNotifier {
    listeners: Option<Arc<Mutex<Listeners>>>,
}

impl JobNotifier {
    pub fn complete(mut self) {
        self.fire(JobOutcome::Completed);
    }

    pub fn fail(mut self, reason: impl Into<String>) {
        self.fire(JobOutcome::Failed(reason.into()));
    }

    pub fn cancel(mut self) {
        self.fire(JobOutcome::Cancelled);
    }

    fn fire(&mut self, outcome: JobOutcome) {
        let Some(listeners) = self.listeners.take() else {
            return;
        };
        let mut guard = listeners.lock();
        if guard.fired.is_some() {
            return;
        }
        guard.fired = Some(outcome.clone());
        let on_complete = std::mem::take(&mut guard.on_complete);
        let on_failed = std::mem::take(&mut guard.on_failed);
        let on_cancelled = std::mem::take(&mut guard.on_cancelled);
        drop(guard);

        match outcome {
            JobOutcome::Completed => on_complete.into_iter().for_each(|f| f()),
            JobOutcome::Failed(reason) => on_failed.into_iter().for_each(|f| f(reason.clone())),
            JobOutcome::Cancelled => on_cancelled.into_iter().for_each(|f| f()),
        }
    }
}

impl Drop for JobNotifier {
    fn drop(&mut self) {
        if self.listeners.is_some() {
            tracing::warn!("Job notifier dropped without an outcome");
            self.fire(JobOutcome::Failed("device lost track of the job".to_string()));
        }
    }
}
