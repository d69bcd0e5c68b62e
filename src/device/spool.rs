//! OS print spooler access through the `lp`/`lpstat` command-line tools.

use crate::device::{
    DeviceError, DeviceGateway, JobHandle, PollingJob, QueueProbe, RenderedDocument, callback_job,
};
use async_trait::async_trait;
use leiriposti_shared::config::{CompletionStrategy, PrinterConfig};
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct SpoolPrinter {
    name: String,
    command: String,
    args: Vec<String>,
    completion: CompletionStrategy,
    poll_interval: Duration,
    probe: Arc<dyn QueueProbe>,
}

impl SpoolPrinter {
    /// Build a printer from config without checking that the destination exists.
    /// Returns `None` when no printer name is configured.
    pub fn from_config(config: &PrinterConfig) -> Option<Self> {
        let name = config.name.clone()?;
        Some(Self {
            probe: Arc::new(LpstatProbe::new(&config.queue_probe, &name)),
            name,
            command: config.command.clone(),
            args: config.args.clone(),
            completion: config.completion,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Like [`from_config`](Self::from_config), but fails with `Unavailable` unless the
    /// spooler knows the destination.
    pub async fn connect(config: &PrinterConfig) -> Result<Self, DeviceError> {
        let printer = Self::from_config(config)
            .ok_or_else(|| DeviceError::Unavailable("no printer name configured".to_string()))?;
        let known = list_printers(&config.queue_probe).await?;
        if !known.iter().any(|p| p == &printer.name) {
            tracing::error!("Printer not found: {} (known: {})", printer.name, known.join(", "));
            return Err(DeviceError::Unavailable(format!("printer '{}' not found", printer.name)));
        }
        tracing::info!("Connected to printer: {}", printer.name);
        Ok(printer)
    }

    fn spool_command(&self, title: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-d")
            .arg(&self.name)
            .arg("-t")
            .arg(title)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        cmd
    }
}

#[async_trait]
impl DeviceGateway for SpoolPrinter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, document: RenderedDocument) -> Result<Box<dyn JobHandle>, DeviceError> {
        let mut child = self.spool_command(&document.title).spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DeviceError::Unavailable(format!("spool command '{}' not found", self.command)),
            _ => DeviceError::Io(e),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(&document.body).await?;
                stdin.shutdown().await
            }
            .await;
            if let Err(e) = written {
                tracing::error!("Could not send '{}' to {}: {}", document.title, self.command, e);
                // Reap the spool process before giving up on the job.
                if let Err(kill) = child.kill().await {
                    tracing::warn!("Could not stop {}: {}", self.command, kill);
                }
                return Err(DeviceError::Io(e));
            }
        }
        tracing::debug!("Spooled '{}' to {}", document.title, self.name);

        match self.completion {
            CompletionStrategy::Exit => {
                let (job, notifier) = callback_job();
                tokio::spawn(async move {
                    match child.wait_with_output().await {
                        Ok(output) if output.status.success() => notifier.complete(),
                        Ok(output) => notifier.fail(spool_failure(output.status, &output.stderr)),
                        Err(e) => notifier.fail(e.to_string()),
                    }
                });
                Ok(Box::new(job))
            }
            CompletionStrategy::Poll => {
                let output = child.wait_with_output().await?;
                if !output.status.success() {
                    return Err(DeviceError::Rejected(spool_failure(output.status, &output.stderr)));
                }
                Ok(Box::new(PollingJob::new(self.probe.clone(), self.poll_interval)))
            }
        }
    }
}

fn spool_failure(status: std::process::ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("spool command exited with {status}")
    } else {
        format!("spool command exited with {status}: {stderr}")
    }
}

/// Counts a destination's pending jobs with `lpstat -o <printer>`.
pub struct LpstatProbe {
    command: String,
    printer: String,
}

impl LpstatProbe {
    pub fn new(command: &str, printer: &str) -> Self {
        Self {
            command: command.to_string(),
            printer: printer.to_string(),
        }
    }
}

#[async_trait]
impl QueueProbe for LpstatProbe {
    async fn queued_jobs(&self) -> Result<usize, DeviceError> {
        let output = Command::new(&self.command).arg("-o").arg(&self.printer).output().await?;
        if !output.status.success() {
            return Err(DeviceError::Unavailable(spool_failure(output.status, &output.stderr)));
        }
        Ok(count_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Spooler destinations, as listed by `<lpstat> -e`.
pub async fn list_printers(lpstat: &str) -> Result<Vec<String>, DeviceError> {
    let output = Command::new(lpstat)
        .arg("-e")
        .output()
        .await
        .map_err(|e| DeviceError::Unavailable(format!("cannot run {lpstat}: {e}")))?;
    if !output.status.success() {
        return Err(DeviceError::Unavailable(spool_failure(output.status, &output.stderr)));
    }
    let printers = parse_destinations(&String::from_utf8_lossy(&output.stdout));
    if printers.is_empty() {
        tracing::warn!("No printers found");
    }
    Ok(printers)
}

fn parse_destinations(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn count_lines(stdout: &str) -> usize {
    stdout.lines().filter(|l| !l.trim().is_empty()).count()
}
