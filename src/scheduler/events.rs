//! Notifications published by the scheduler. Observers subscribe to a broadcast channel;
//! a slow observer misses events rather than stalling the worker.

use leiriposti_shared::MessageStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A worker was spawned with `total` records waiting.
    Started { total: usize },
    /// A job was submitted; `fraction` is jobs started over jobs in this run.
    Progress { fraction: f64, subject: String },
    JobFinished {
        subject: String,
        status: MessageStatus,
        elapsed_ms: u64,
    },
    /// The worker stopped at a pause request with records still waiting.
    Paused,
    /// The worker ran out of records. Sent once per worker run.
    QueueDrained,
    /// The device refused a submission; the record went back to the head of the queue.
    DeviceUnavailable { reason: String },
    /// The in-flight job was interrupted or cancelled and the worker stopped.
    Interrupted,
}

impl SchedulerEvent {
    /// True for the events that end a worker run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SchedulerEvent::Paused
                | SchedulerEvent::QueueDrained
                | SchedulerEvent::DeviceUnavailable { .. }
                | SchedulerEvent::Interrupted
        )
    }
}
