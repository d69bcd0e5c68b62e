//! Shared configuration logic for the CLI, the sim harness, and tests.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [printer]
//! name = "Brother_HL_L2350DW"
//! completion = "poll"
//! poll_interval_ms = 2500
//!
//! [scheduler]
//! allow_printing_override = false
//!
//! [session]
//! directory = "session_profiles"
//!
//! [source]
//! rows = "exports/sheet.json"
//! timezone = "Europe/Helsinki"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printer.command.trim().is_empty() {
            return Err(ConfigError::Invalid("printer.command must not be empty".to_string()));
        }
        if self.printer.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("printer.poll_interval_ms must be positive".to_string()));
        }
        if self.scheduler.event_capacity == 0 {
            return Err(ConfigError::Invalid("scheduler.event_capacity must be positive".to_string()));
        }
        if self.source.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Invalid(format!("unknown timezone '{}'", self.source.timezone)));
        }
        Ok(())
    }
}

/// How a spooled job reports that it is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStrategy {
    /// The spool command exiting is the completion callback.
    #[default]
    Exit,
    /// Poll the device queue depth until it drains.
    Poll,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    /// Spooler destination. Unset means no device is configured.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub completion: CompletionStrategy,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_queue_probe")]
    pub queue_probe: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: None,
            command: default_command(),
            args: Vec::new(),
            completion: CompletionStrategy::default(),
            poll_interval_ms: default_poll_interval_ms(),
            queue_probe: default_queue_probe(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Debug mode: lets status changes through while a record is printing.
    #[serde(default)]
    pub allow_printing_override: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allow_printing_override: false,
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub profile: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            directory: default_session_directory(),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub rows: Option<PathBuf>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            rows: None,
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

fn default_command() -> String { "lp".to_string() }
fn default_poll_interval_ms() -> u64 { 2500 }
fn default_queue_probe() -> String { "lpstat".to_string() }
fn default_event_capacity() -> usize { 64 }
fn default_session_directory() -> PathBuf { PathBuf::from("session_profiles") }
fn default_timezone() -> String { "Europe/Helsinki".to_string() }
fn default_log_level() -> String { "info".to_string() }

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}
