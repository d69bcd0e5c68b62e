//! The background print worker. One per scheduler run; exits when the queue drains, on a
//! pause request between jobs, on an unavailable device, or on interruption.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::device::{DeviceError, DeviceGateway};
use crate::message::MessageHandle;
use crate::render::render_letter;
use crate::scheduler::status::{self, Actor};
use crate::scheduler::watcher::{JobOutcome, JobWatcher};
use crate::scheduler::{SchedulerError, SchedulerEvent, SchedulerInner};
use leiriposti_shared::MessageStatus;

/// Requests delivered to the worker. Each carries a channel the worker answers once it has
/// stopped.
#[derive(Debug)]
pub(crate) enum ControlCommand {
    Pause { respond_to: oneshot::Sender<()> },
    Shutdown { respond_to: oneshot::Sender<()> },
}

#[derive(Debug)]
enum Exit {
    Drained,
    Paused,
    Interrupted,
    DeviceUnavailable(String),
}

pub(crate) async fn run(
    inner: Arc<SchedulerInner>,
    device: Arc<dyn DeviceGateway>,
    mut control: mpsc::UnboundedReceiver<ControlCommand>,
) {
    tracing::debug!("Print worker started");
    let mut pending: Vec<oneshot::Sender<()>> = Vec::new();
    // Declared after `pending` so it runs before parked callers are released.
    let mut guard = AbortGuard {
        inner: inner.clone(),
        armed: true,
    };

    let exit = loop {
        // Between jobs: pick up control requests without blocking.
        let mut shutdown = false;
        while let Ok(command) = control.try_recv() {
            shutdown |= absorb(command, &mut pending);
        }
        if shutdown {
            break Exit::Interrupted;
        }

        let (record, fraction) = {
            let mut state = inner.state.lock();
            // An empty queue is drained even if a pause came in during the last job.
            if state.queue.is_empty() {
                break Exit::Drained;
            }
            if state.paused {
                break Exit::Paused;
            }
            let Some(record) = state.queue.dequeue_next() else {
                break Exit::Drained;
            };
            let _ = status::apply(&mut state.queue, &record, MessageStatus::Printing, Actor::Worker, true);
            state.in_flight = Some(record.clone());
            state.started += 1;
            let fraction = state.started as f64 / (state.started + state.queue.len()) as f64;
            (record, fraction)
        };

        match print_one(&inner, device.as_ref(), &record, fraction, &mut control, &mut pending).await {
            Ok(()) => {}
            Err(exit) => break exit,
        }
    };

    guard.armed = false;
    finish(&inner, exit, control, pending);
}

/// Cleans up after a worker that never reached `finish`: a panicking device or an aborted
/// task. Pending control requests are released when their senders drop with the task.
struct AbortGuard {
    inner: Arc<SchedulerInner>,
    armed: bool,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let record = {
            let mut state = self.inner.state.lock();
            state.worker = None;
            state.started = 0;
            let record = state.in_flight.take();
            if let Some(record) = &record {
                let _ = status::apply(&mut state.queue, record, MessageStatus::Error, Actor::Worker, true);
            }
            self.inner.running.send_replace(false);
            record
        };
        match record {
            Some(record) => tracing::error!("Print worker died while printing '{}'", record.subject()),
            None => tracing::error!("Print worker died"),
        }
        self.inner.emit(SchedulerEvent::Interrupted);
    }
}

/// Submit one record and wait for it. `Err` means the loop must stop.
async fn print_one(
    inner: &SchedulerInner,
    device: &dyn DeviceGateway,
    record: &MessageHandle,
    fraction: f64,
    control: &mut mpsc::UnboundedReceiver<ControlCommand>,
    pending: &mut Vec<oneshot::Sender<()>>,
) -> Result<(), Exit> {
    let document = render_letter(record);
    let job = match device.submit(document).await {
        Ok(job) => job,
        Err(DeviceError::Unavailable(reason)) => {
            tracing::error!("Printer unavailable, '{}' goes back to the queue: {}", record.subject(), reason);
            let mut state = inner.state.lock();
            state.in_flight = None;
            state.started = state.started.saturating_sub(1);
            status::requeue_front(&mut state.queue, record);
            return Err(Exit::DeviceUnavailable(reason));
        }
        Err(e) => {
            tracing::error!("Failed to print message '{}': {}", record.subject(), e);
            settle(inner, record, MessageStatus::Error, 0);
            return Ok(());
        }
    };
    tracing::debug!("Sent message to printer: {}", record.subject());
    inner.emit(SchedulerEvent::Progress {
        fraction,
        subject: record.subject().to_string(),
    });

    let watcher = JobWatcher::new();
    job.watch(watcher.clone());

    match watcher.wait_or_interrupt(interrupted(control, pending)).await {
        Ok(report) => match report.outcome {
            JobOutcome::Completed => {
                tracing::info!("Printed '{}' in {} ms", record.subject(), report.elapsed_ms);
                settle(inner, record, MessageStatus::Printed, report.elapsed_ms);
                Ok(())
            }
            JobOutcome::Failed(reason) => {
                let error = SchedulerError::DeviceJobFailed(reason);
                tracing::error!("'{}': {}", record.subject(), error);
                settle(inner, record, MessageStatus::Error, report.elapsed_ms);
                Ok(())
            }
            JobOutcome::Cancelled => {
                tracing::warn!("Print job for '{}' was cancelled at the printer", record.subject());
                settle(inner, record, MessageStatus::Error, report.elapsed_ms);
                Err(Exit::Interrupted)
            }
        },
        Err(e) => {
            // Stop any helper still watching the device for this job.
            watcher.signal_done(JobOutcome::Cancelled);
            tracing::error!("Print job for '{}' did not finish: {}", record.subject(), e);
            settle(inner, record, MessageStatus::Error, 0);
            Err(Exit::Interrupted)
        }
    }
}

fn settle(inner: &SchedulerInner, record: &MessageHandle, target: MessageStatus, elapsed_ms: u64) {
    {
        let mut state = inner.state.lock();
        let _ = status::apply(&mut state.queue, record, target, Actor::Worker, true);
        state.in_flight = None;
    }
    inner.emit(SchedulerEvent::JobFinished {
        subject: record.subject().to_string(),
        status: target,
        elapsed_ms,
    });
}

/// Resolves on a shutdown request or when the scheduler goes away. Pause requests that arrive
/// meanwhile are parked; the current job always runs to completion for them.
async fn interrupted(control: &mut mpsc::UnboundedReceiver<ControlCommand>, pending: &mut Vec<oneshot::Sender<()>>) {
    loop {
        match control.recv().await {
            Some(command) => {
                if absorb(command, pending) {
                    return;
                }
            }
            None => return,
        }
    }
}

/// Park the responder; true if the command asks the worker to stop now.
fn absorb(command: ControlCommand, pending: &mut Vec<oneshot::Sender<()>>) -> bool {
    match command {
        ControlCommand::Pause { respond_to } => {
            pending.push(respond_to);
            false
        }
        ControlCommand::Shutdown { respond_to } => {
            pending.push(respond_to);
            true
        }
    }
}

fn finish(
    inner: &SchedulerInner,
    exit: Exit,
    mut control: mpsc::UnboundedReceiver<ControlCommand>,
    mut pending: Vec<oneshot::Sender<()>>,
) {
    {
        let mut state = inner.state.lock();
        state.worker = None;
        state.in_flight = None;
        state.started = 0;
        inner.running.send_replace(false);
    }

    // Anything sent before `worker` was cleared is still in the channel.
    control.close();
    while let Ok(command) = control.try_recv() {
        absorb(command, &mut pending);
    }

    match exit {
        Exit::Drained => {
            tracing::info!("Printing complete, queue drained");
            inner.emit(SchedulerEvent::QueueDrained);
        }
        Exit::Paused => {
            tracing::info!("Printing paused");
            inner.emit(SchedulerEvent::Paused);
        }
        Exit::Interrupted => {
            tracing::warn!("Print worker interrupted");
            inner.emit(SchedulerEvent::Interrupted);
        }
        Exit::DeviceUnavailable(reason) => {
            inner.emit(SchedulerEvent::DeviceUnavailable { reason });
        }
    }

    for respond_to in pending {
        let _ = respond_to.send(());
    }
    tracing::debug!("Print worker stopped");
}
