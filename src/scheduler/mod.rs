// src/scheduler/mod.rs
//! Print scheduler: owns the print queue and at most one background worker that feeds the
//! printer one letter at a time.
//!
//! Callers on any thread enqueue, dequeue and remove records and start or pause the worker.
//! The worker pulls the next record under the scheduler lock, submits it, and waits for the
//! device to finish before touching the queue again, so the device never has more than one
//! outstanding job. Pause and shutdown reach the worker over a control channel; pause is only
//! honoured between jobs.

pub mod events;
pub mod queue;
pub mod status;
pub mod watcher;
mod worker;

pub use events::SchedulerEvent;
pub use queue::{PrintQueue, QueueSnapshot};
pub use status::Transition;
pub use watcher::{JobOutcome, JobReport, JobWatcher};

use crate::device::{DeviceError, DeviceGateway};
use crate::message::{MessageHandle, MessageStore};
use leiriposti_shared::MessageStatus;
use leiriposti_shared::config::SchedulerConfig;
use parking_lot::{Mutex, RwLock};
use status::Actor;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use worker::ControlCommand;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No printer is configured")]
    DeviceNotConfigured,
    #[error("Printer unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Print job failed: {0}")]
    DeviceJobFailed(String),
    #[error("Interrupted")]
    Interrupted,
}

impl From<DeviceError> for SchedulerError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Unavailable(reason) => SchedulerError::DeviceUnavailable(reason),
            other => SchedulerError::DeviceJobFailed(other.to_string()),
        }
    }
}

/// What `start` did. Only a missing device is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    QueueEmpty,
    AlreadyRunning,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

pub(crate) struct SchedulerInner {
    pub(crate) state: Mutex<SchedulerState>,
    pub(crate) events: broadcast::Sender<SchedulerEvent>,
    pub(crate) running: watch::Sender<bool>,
    pub(crate) allow_override: bool,
    device: RwLock<Option<Arc<dyn DeviceGateway>>>,
    runtime: Handle,
}

pub(crate) struct SchedulerState {
    pub(crate) queue: PrintQueue,
    pub(crate) worker: Option<mpsc::UnboundedSender<ControlCommand>>,
    pub(crate) paused: bool,
    pub(crate) in_flight: Option<MessageHandle>,
    /// Jobs started by the current worker run, for progress reporting.
    pub(crate) started: usize,
}

impl SchedulerInner {
    pub(crate) fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Scheduler {
    /// Must be called from within a Tokio runtime; the worker is spawned onto it.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_runtime(config, Handle::current())
    }

    pub fn with_runtime(config: &SchedulerConfig, runtime: Handle) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    queue: PrintQueue::new(),
                    worker: None,
                    paused: false,
                    in_flight: None,
                    started: 0,
                }),
                events,
                running,
                allow_override: config.allow_printing_override,
                device: RwLock::new(None),
                runtime,
            }),
        }
    }

    pub fn set_device(&self, device: Option<Arc<dyn DeviceGateway>>) {
        match &device {
            Some(d) => tracing::info!("Printer set to: {}", d.name()),
            None => tracing::info!("Printer cleared"),
        }
        *self.inner.device.write() = device;
    }

    pub fn device_name(&self) -> Option<String> {
        self.inner.device.read().as_ref().map(|d| d.name().to_string())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    pub fn enqueue(&self, record: &MessageHandle) -> Transition {
        self.set_status(record, MessageStatus::Queued)
    }

    pub fn dequeue(&self, record: &MessageHandle) -> Transition {
        self.set_status(record, MessageStatus::NotPrinted)
    }

    /// Run a record through the status machine on behalf of a caller.
    pub fn set_status(&self, record: &MessageHandle, target: MessageStatus) -> Transition {
        let mut state = self.inner.state.lock();
        status::apply(&mut state.queue, record, target, Actor::Caller, self.inner.allow_override)
    }

    /// As [`set_status`](Self::set_status), with the target given by name (e.g. from the CLI).
    pub fn set_status_named(&self, record: &MessageHandle, target: &str) -> Result<Transition, SchedulerError> {
        let target: MessageStatus = target
            .parse()
            .map_err(|e: leiriposti_shared::ParseStatusError| SchedulerError::InvalidArgument(e.to_string()))?;
        Ok(self.set_status(record, target))
    }

    /// Take a queued record out of the queue and mark it not printed.
    pub fn remove(&self, record: &MessageHandle) -> bool {
        let mut state = self.inner.state.lock();
        if !state.queue.contains(record) {
            tracing::warn!("Message not found in print queue: {}", record.subject());
            return false;
        }
        status::apply(&mut state.queue, record, MessageStatus::NotPrinted, Actor::Caller, self.inner.allow_override)
            .is_applied()
    }

    pub fn start(&self) -> Result<StartOutcome, SchedulerError> {
        let device = match self.inner.device.read().clone() {
            Some(device) => device,
            None => {
                tracing::error!("No printer is configured");
                return Err(SchedulerError::DeviceNotConfigured);
            }
        };

        let mut state = self.inner.state.lock();
        if state.queue.is_empty() {
            tracing::warn!("Print queue is empty");
            return Ok(StartOutcome::QueueEmpty);
        }
        if state.worker.is_some() {
            tracing::warn!("Print worker is already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        state.worker = Some(control_tx);
        state.paused = false;
        state.started = 0;
        let total = state.queue.len();
        self.inner.running.send_replace(true);
        drop(state);

        tracing::info!("Starting print worker on '{}' with {} letters queued", device.name(), total);
        self.inner.emit(SchedulerEvent::Started { total });
        self.inner
            .runtime
            .spawn(worker::run(self.inner.clone(), device, control_rx));
        Ok(StartOutcome::Started)
    }

    /// Clear a pause and start the worker again.
    pub fn resume(&self) -> Result<StartOutcome, SchedulerError> {
        self.inner.state.lock().paused = false;
        self.start()
    }

    /// Stop taking new jobs. Returns once the in-flight job, if any, has finished.
    pub async fn pause(&self) {
        let ack = {
            let mut state = self.inner.state.lock();
            state.paused = true;
            self.send_control(&state, |respond_to| ControlCommand::Pause { respond_to })
        };
        if let Some(ack) = ack {
            tracing::info!("Pause requested, waiting for the current job to finish");
            let _ = ack.await;
        }
    }

    /// Interrupt the in-flight job and stop the worker. The interrupted record becomes `ERROR`.
    pub async fn shutdown(&self) {
        let ack = {
            let state = self.inner.state.lock();
            self.send_control(&state, |respond_to| ControlCommand::Shutdown { respond_to })
        };
        if let Some(ack) = ack {
            tracing::info!("Shutdown requested, interrupting the print worker");
            let _ = ack.await;
        }
    }

    fn send_control(
        &self,
        state: &SchedulerState,
        command: impl FnOnce(oneshot::Sender<()>) -> ControlCommand,
    ) -> Option<oneshot::Receiver<()>> {
        let control = state.worker.as_ref()?;
        let (tx, rx) = oneshot::channel();
        // The worker drains its channel after clearing `state.worker`, so this cannot be lost.
        control.send(command(tx)).ok()?;
        Some(rx)
    }

    /// Whether a worker is running and has not been asked to pause.
    pub fn is_active(&self) -> bool {
        let state = self.inner.state.lock();
        state.worker.is_some() && !state.paused
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Resolves once no worker is running.
    pub async fn wait_until_idle(&self) {
        let mut running = self.inner.running.subscribe();
        let _ = running.wait_for(|running| !running).await;
    }

    pub fn in_flight(&self) -> Option<MessageHandle> {
        self.inner.state.lock().in_flight.clone()
    }

    pub fn queued(&self) -> Vec<MessageHandle> {
        self.inner.state.lock().queue.iter().cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.state.lock().queue.snapshot()
    }

    /// Rebuild the queue from a snapshot without submitting anything to the device.
    /// Records missing from `store` are added to it. Returns how many records were queued.
    pub fn restore(&self, snapshot: &QueueSnapshot, store: &MessageStore) -> usize {
        let mut state = self.inner.state.lock();
        let mut restored = 0;
        for content in &snapshot.records {
            let record = store.insert(content.clone());
            if status::apply(&mut state.queue, &record, MessageStatus::Queued, Actor::Worker, true).is_applied() {
                restored += 1;
            }
        }
        tracing::info!("Restored {} queued letters ({} in queue)", restored, state.queue.len());
        restored
    }
}
