// src/device/mod.rs
//! Printer access. The scheduler only sees [`DeviceGateway`]: it submits one rendered letter
//! and gets back a [`JobHandle`] that reports, through a [`JobWatcher`], when the printer is
//! done with it.

pub mod callback;
pub mod polling;
pub mod simulated;
pub mod spool;

pub use callback::{CallbackJob, JobNotifier, callback_job};
pub use polling::{PollingJob, QueueProbe};
pub use simulated::{SimulatedOutcome, SimulatedPrinter, parse_script};
pub use spool::{LpstatProbe, SpoolPrinter, list_printers};

use crate::scheduler::JobWatcher;
use async_trait::async_trait;
use std::io;
use thiserror::Error;

/// A letter ready for the printer. `title` becomes the spool job name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub title: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Printer unavailable: {0}")]
    Unavailable(String),
    #[error("Printer rejected the job: {0}")]
    Rejected(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A submitted job. `watch` ties the job's end, whichever way it ends, to the watcher.
pub trait JobHandle: Send {
    fn watch(self: Box<Self>, watcher: JobWatcher);
}

#[async_trait]
pub trait DeviceGateway: Send + Sync {
    fn name(&self) -> &str;
    async fn submit(&self, document: RenderedDocument) -> Result<Box<dyn JobHandle>, DeviceError>;
}
