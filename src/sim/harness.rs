//! Simulation harness: runs a print scenario against the simulated printer and reports how
//! every letter ended up.

use chrono::{Duration as ChronoDuration, FixedOffset, TimeZone};
use clap::Parser;
use leiriposti::config::{self, SchedulerConfig};
use leiriposti::device::parse_script;
use leiriposti::{MessageContent, MessageStore, Scheduler, SchedulerEvent, SimulatedPrinter, StartOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Print simulation CLI
#[derive(Parser, Debug)]
#[command(name = "print_sim", about = "Runs the print scheduler against a simulated printer.")]
struct Cli {
    /// Path to a TOML config file; only the [scheduler] section is used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of letters to queue
    #[arg(short, long, default_value_t = 3)]
    letters: usize,

    /// Per-job outcomes, e.g. "ok,fail,ok" (ok, fail, cancel, reject, unavailable, hang)
    #[arg(short, long, default_value = "")]
    script: String,

    /// Simulated print time per letter, in milliseconds
    #[arg(long, default_value_t = 200)]
    latency_ms: u64,

    /// Chance that an unscripted letter fails (0.0 - 1.0)
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Pause after this many letters, then resume
    #[arg(long)]
    pause_after: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level.parse().unwrap_or(tracing::Level::INFO))
        .init();

    let scheduler_config: SchedulerConfig = match &cli.config {
        Some(path) => config::load_config(path)?.scheduler,
        None => SchedulerConfig::default(),
    };
    let script = parse_script(&cli.script)?;

    let store = MessageStore::new();
    let scheduler = Scheduler::new(&scheduler_config);
    let printer = Arc::new(
        SimulatedPrinter::new("simulated", Duration::from_millis(cli.latency_ms))
            .with_script(script)
            .with_failure_rate(cli.failure_rate),
    );
    scheduler.set_device(Some(printer.clone()));

    let base = FixedOffset::east_opt(3 * 3600)
        .and_then(|tz| tz.with_ymd_and_hms(2025, 6, 9, 8, 0, 0).single())
        .ok_or("invalid base timestamp")?;
    for i in 0..cli.letters {
        let record = store.insert(MessageContent {
            recipient: format!("Leiriläinen {}", i + 1),
            subject: letter_subject(i),
            body: "Terveisiä kotoa! Toivottavasti leirillä on mukavaa.".to_string(),
            author: "Koti".to_string(),
            timestamp: base + ChronoDuration::hours(i as i64),
        });
        let _ = scheduler.enqueue(&record);
    }

    let mut events = scheduler.subscribe();
    let mut finished = 0;
    if scheduler.start()? != StartOutcome::Started {
        println!("Nothing to print");
        return Ok(());
    }

    while let Ok(event) = events.recv().await {
        match &event {
            SchedulerEvent::JobFinished { subject, status, elapsed_ms } => {
                finished += 1;
                println!("{subject}: {status} after {elapsed_ms} ms");
                if cli.pause_after == Some(finished) {
                    println!("Pausing after {finished} letters");
                    scheduler.pause().await;
                }
            }
            SchedulerEvent::Paused => {
                println!("Paused with {} letters queued, resuming", scheduler.queue_len());
                scheduler.wait_until_idle().await;
                if scheduler.resume()? != StartOutcome::Started {
                    break;
                }
            }
            other => println!("{other:?}"),
        }
        if event.is_terminal() && event != SchedulerEvent::Paused {
            break;
        }
    }

    println!();
    for record in store.all() {
        println!("{record}");
    }
    println!(
        "submitted {} jobs, at most {} outstanding",
        printer.submitted_titles().len(),
        printer.max_outstanding()
    );
    Ok(())
}

fn letter_subject(index: usize) -> String {
    const SUBJECTS: [&str; 3] = ["A", "B", "C"];
    match SUBJECTS.get(index) {
        Some(subject) => subject.to_string(),
        None => format!("Kirje {}", index + 1),
    }
}
