// src/session.rs
//! Session profiles: everything needed to pick up where the last run stopped, stored as one
//! JSON file per session.

use crate::message::MessageStore;
use crate::scheduler::{QueueSnapshot, Scheduler};
use leiriposti_shared::{MessageContent, MessageStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SESSION_FILE: &str = "default_session.json";
pub const DEFAULT_SESSION_NAME: &str = "Default Session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(flatten)]
    pub content: MessageContent,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub session_id: String,
    pub session_name: String,
    #[serde(default)]
    pub last_row: usize,
    #[serde(default)]
    pub selected_printer: Option<String>,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub print_queue: QueueSnapshot,
}

impl SessionProfile {
    pub fn new(session_name: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            session_id: id[..8].to_string(),
            session_name: session_name.to_string(),
            last_row: 1,
            selected_printer: None,
            spreadsheet_id: None,
            is_default: false,
            messages: Vec::new(),
            print_queue: QueueSnapshot::default(),
        }
    }

    pub fn default_session() -> Self {
        Self {
            is_default: true,
            ..Self::new(DEFAULT_SESSION_NAME)
        }
    }

    pub fn file_name(&self) -> String {
        if self.is_default {
            DEFAULT_SESSION_FILE.to_string()
        } else {
            format!("{}.json", self.session_id)
        }
    }

    /// Copy the current messages and print queue into the profile.
    pub fn capture(&mut self, store: &MessageStore, scheduler: &Scheduler) {
        self.messages = store
            .all()
            .iter()
            .map(|m| StoredMessage {
                content: m.content().clone(),
                status: m.status(),
            })
            .collect();
        self.print_queue = scheduler.snapshot();
    }

    /// Load the profile's messages into `store` and rebuild the scheduler's queue. Nothing is
    /// sent to the printer. Returns the number of records queued.
    pub fn rehydrate(&self, store: &MessageStore, scheduler: &Scheduler) -> usize {
        for stored in &self.messages {
            let status = match stored.status {
                MessageStatus::Printing => {
                    tracing::warn!(
                        "'{}' was printing when the session was saved; marking it as ERROR",
                        stored.content.subject
                    );
                    MessageStatus::Error
                }
                // Queued records come back through the snapshot below.
                MessageStatus::Queued => MessageStatus::NotPrinted,
                other => other,
            };
            store.insert_with_status(stored.content.clone(), status);
        }
        scheduler.restore(&self.print_queue, store)
    }
}

/// Session profiles kept in one directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    directory: PathBuf,
}

impl SessionStore {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn save(&self, profile: &SessionProfile) -> Result<PathBuf, SessionError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(profile.file_name());
        let json = serde_json::to_string_pretty(profile)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            tracing::error!("Failed to save session profile {}: {}", path.display(), e);
            e
        })?;
        tracing::info!("Session profile saved: {}", path.display());
        Ok(path)
    }

    /// Every readable profile in the directory. Files that fail to parse are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<SessionProfile>, SessionError> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No session directory at {}", self.directory.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut profiles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_profile(&path).await {
                Ok(profile) => profiles.push(profile),
                Err(e) => tracing::warn!("Skipping session profile {}: {}", path.display(), e),
            }
        }
        profiles.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(a.session_name.cmp(&b.session_name)));
        tracing::info!("Loaded {} session profiles", profiles.len());
        Ok(profiles)
    }

    /// The stored default profile, or a fresh one if there is none.
    pub async fn default_profile(&self) -> Result<SessionProfile, SessionError> {
        let profiles = self.load_all().await?;
        Ok(profiles
            .into_iter()
            .find(|p| p.is_default)
            .unwrap_or_else(SessionProfile::default_session))
    }

    /// Look a profile up by id or name.
    pub async fn find(&self, key: &str) -> Result<SessionProfile, SessionError> {
        self.load_all()
            .await?
            .into_iter()
            .find(|p| p.session_id == key || p.session_name == key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }
}

async fn read_profile(path: &Path) -> Result<SessionProfile, SessionError> {
    let data = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&data)?)
}
