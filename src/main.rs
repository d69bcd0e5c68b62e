// src/main.rs
use clap::{Parser, Subcommand};
use leiriposti::config::{self, Config};
use leiriposti::device::{SpoolPrinter, list_printers};
use leiriposti::scheduler::{Scheduler, SchedulerEvent, StartOutcome, Transition};
use leiriposti::session::{SessionProfile, SessionStore};
use leiriposti::source::{MessageSource, SheetRowSource};
use leiriposti::{DeviceGateway, MessageHandle, MessageStatus, MessageStore, SimulatedPrinter, StatusFilter};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser, Debug)]
#[command(name = "leiriposti", version, about = "Prints camp mail one letter at a time.")]
struct Cli {
    /// Path to a TOML config file (default: leiriposti.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides [logging] level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Session profile name or id; overrides [session] profile
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch new rows from the sheet export into the session
    Import {
        #[arg(long)]
        rows: Option<PathBuf>,
    },
    /// List messages with their index
    List {
        /// NOT_PRINTED, QUEUED, PRINTING, PRINTED, ERROR, REMOVED or ALL
        #[arg(long, default_value = "ALL")]
        status: StatusFilter,
    },
    /// Add messages to the print queue
    Queue { indexes: Vec<usize> },
    /// Take messages out of the print queue
    Unqueue { indexes: Vec<usize> },
    /// Mark messages as removed
    Delete { indexes: Vec<usize> },
    /// Print the queue
    Print {
        /// Use an in-process simulated printer
        #[arg(long)]
        simulate: bool,
        /// Queue every NOT_PRINTED message first
        #[arg(long)]
        all: bool,
    },
    /// List printers known to the spooler
    Printers,
    /// List stored session profiles
    Sessions,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = config::load_or_default(cli.config.as_deref()).map_err(|e| {
        eprintln!("Failed to load config: {e}");
        Box::new(e) as BoxError
    })?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from_str(level).unwrap_or(tracing::Level::INFO))
        .init();

    let sessions = SessionStore::new(&config.session.directory);
    let mut profile = match cli.session.as_deref().or(config.session.profile.as_deref()) {
        Some(key) => sessions.find(key).await?,
        None => sessions.default_profile().await?,
    };
    tracing::info!("Using session '{}' ({})", profile.session_name, profile.session_id);

    let store = MessageStore::new();
    let scheduler = Scheduler::new(&config.scheduler);
    profile.rehydrate(&store, &scheduler);

    match cli.command {
        Commands::Import { rows } => {
            let Some(rows) = rows.or_else(|| config.source.rows.clone()) else {
                return Err("no sheet export given; pass --rows or set [source] rows".into());
            };
            let mut source = SheetRowSource::new(&rows, &config.source.timezone, profile.last_row)?;
            let fetched = source.fetch_new().await?;
            let before = store.len();
            for content in fetched {
                store.insert(content);
            }
            profile.last_row = source.last_row();
            println!("Imported {} new messages", store.len() - before);
            save(&sessions, &mut profile, &store, &scheduler).await?;
        }
        Commands::List { status } => {
            for (index, message) in store.all().iter().enumerate() {
                if status.matches(message.status()) {
                    println!("{:>4}  {}  {}", index + 1, message.timestamp().format("%d.%m.%Y %H:%M"), message);
                }
            }
        }
        Commands::Queue { indexes } => {
            change_status(&store, &scheduler, &indexes, MessageStatus::Queued)?;
            save(&sessions, &mut profile, &store, &scheduler).await?;
        }
        Commands::Unqueue { indexes } => {
            change_status(&store, &scheduler, &indexes, MessageStatus::NotPrinted)?;
            save(&sessions, &mut profile, &store, &scheduler).await?;
        }
        Commands::Delete { indexes } => {
            change_status(&store, &scheduler, &indexes, MessageStatus::Removed)?;
            save(&sessions, &mut profile, &store, &scheduler).await?;
        }
        Commands::Print { simulate, all } => {
            if all {
                for message in store.filter(StatusFilter::Only(MessageStatus::NotPrinted)) {
                    let _ = scheduler.enqueue(&message);
                }
            }
            let device = select_device(&config, simulate).await?;
            if let Some(device) = &device {
                profile.selected_printer = Some(device.name().to_string());
            }
            scheduler.set_device(device);
            print_queue(&scheduler).await?;
            save(&sessions, &mut profile, &store, &scheduler).await?;
        }
        Commands::Printers => {
            for printer in list_printers(&config.printer.queue_probe).await? {
                let marker = if config.printer.name.as_deref() == Some(printer.as_str()) { "*" } else { " " };
                println!("{marker} {printer}");
            }
        }
        Commands::Sessions => {
            for p in sessions.load_all().await? {
                let marker = if p.is_default { "*" } else { " " };
                println!("{marker} {}  {}  ({} messages)", p.session_id, p.session_name, p.messages.len());
            }
        }
    }
    Ok(())
}

fn lookup(store: &MessageStore, index: usize) -> Result<MessageHandle, BoxError> {
    index
        .checked_sub(1)
        .and_then(|i| store.all().get(i).cloned())
        .ok_or_else(|| format!("no message with index {index}").into())
}

fn change_status(
    store: &MessageStore,
    scheduler: &Scheduler,
    indexes: &[usize],
    target: MessageStatus,
) -> Result<(), BoxError> {
    for &index in indexes {
        let message = lookup(store, index)?;
        match scheduler.set_status(&message, target) {
            Transition::Applied => println!("{:>4}  {}", index, message),
            Transition::Refused { current } => {
                println!("{:>4}  refused: '{}' is {}", index, message.subject(), current)
            }
        }
    }
    Ok(())
}

async fn select_device(config: &Config, simulate: bool) -> Result<Option<Arc<dyn DeviceGateway>>, BoxError> {
    if simulate {
        return Ok(Some(Arc::new(SimulatedPrinter::new("simulated", Duration::from_millis(500)))));
    }
    if config.printer.name.is_none() {
        return Ok(None);
    }
    let printer = SpoolPrinter::connect(&config.printer)
        .await
        .map_err(leiriposti::SchedulerError::from)?;
    Ok(Some(Arc::new(printer)))
}

async fn print_queue(scheduler: &Scheduler) -> Result<(), BoxError> {
    let mut events = scheduler.subscribe();
    match scheduler.start()? {
        StartOutcome::Started => {}
        StartOutcome::QueueEmpty => {
            println!("Nothing to print");
            return Ok(());
        }
        StartOutcome::AlreadyRunning => return Ok(()),
    }

    let reporter = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} printer events", missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match &event {
                SchedulerEvent::Started { total } => println!("Printing {total} letters"),
                SchedulerEvent::Progress { fraction, subject } => {
                    println!("[{:>3.0}%] {}", fraction * 100.0, subject)
                }
                SchedulerEvent::JobFinished {
                    subject,
                    status,
                    elapsed_ms,
                } => println!("       {subject}: {status} ({elapsed_ms} ms)"),
                SchedulerEvent::Paused => println!("Paused"),
                SchedulerEvent::QueueDrained => println!("All letters printed"),
                SchedulerEvent::DeviceUnavailable { reason } => println!("Printer unavailable: {reason}"),
                SchedulerEvent::Interrupted => println!("Printing interrupted"),
            }
            if event.is_terminal() {
                break;
            }
        }
    });

    tokio::select! {
        _ = scheduler.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl-C received, stopping the printer");
            scheduler.shutdown().await;
        }
    }
    let _ = reporter.await;
    Ok(())
}

async fn save(
    sessions: &SessionStore,
    profile: &mut SessionProfile,
    store: &MessageStore,
    scheduler: &Scheduler,
) -> Result<(), BoxError> {
    profile.capture(store, scheduler);
    sessions.save(profile).await?;
    Ok(())
}
