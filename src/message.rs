// src/message.rs
//! Message records and the application-wide list that owns them.
//!
//! A [`Message`] is shared by handle between the [`MessageStore`] and the scheduler's print
//! queue. Its content never changes; its status is written only by the scheduler's status
//! machine while the scheduler lock is held.

use chrono::{DateTime, FixedOffset, Weekday};
use leiriposti_shared::{MessageContent, MessageStatus, StatusFilter};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

pub type MessageHandle = Arc<Message>;

#[derive(Debug)]
pub struct Message {
    content: MessageContent,
    status: RwLock<MessageStatus>,
}

impl Message {
    pub fn new(content: MessageContent) -> Self {
        Self::with_status(content, MessageStatus::NotPrinted)
    }

    pub(crate) fn with_status(content: MessageContent, status: MessageStatus) -> Self {
        Self {
            content,
            status: RwLock::new(status),
        }
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn recipient(&self) -> &str {
        &self.content.recipient
    }

    pub fn subject(&self) -> &str {
        &self.content.subject
    }

    pub fn body(&self) -> &str {
        &self.content.body
    }

    pub fn author(&self) -> &str {
        &self.content.author
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.content.timestamp
    }

    pub fn weekday(&self) -> Weekday {
        self.content.weekday()
    }

    pub fn status(&self) -> MessageStatus {
        *self.status.read()
    }

    // Only the status machine calls this, under the scheduler lock.
    pub(crate) fn set_status(&self, status: MessageStatus) {
        *self.status.write() = status;
    }
}

/// Records are the same record when their content matches; status is not part of identity.
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
    }
}

impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} - {}", self.content.recipient, self.content.subject, self.status())
    }
}

/// Every record imported in this session, in import order.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Arc<RwLock<Vec<MessageHandle>>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, or return the existing handle if an equal record is already stored.
    pub fn insert(&self, content: MessageContent) -> MessageHandle {
        self.insert_with_status(content, MessageStatus::NotPrinted)
    }

    pub(crate) fn insert_with_status(&self, content: MessageContent, status: MessageStatus) -> MessageHandle {
        let mut messages = self.messages.write();
        if let Some(existing) = messages.iter().find(|m| m.content == content) {
            return existing.clone();
        }
        let handle = Arc::new(Message::with_status(content, status));
        messages.push(handle.clone());
        handle
    }

    pub fn find(&self, content: &MessageContent) -> Option<MessageHandle> {
        self.messages.read().iter().find(|m| &m.content == content).cloned()
    }

    pub fn all(&self) -> Vec<MessageHandle> {
        self.messages.read().clone()
    }

    pub fn filter(&self, filter: StatusFilter) -> Vec<MessageHandle> {
        self.messages
            .read()
            .iter()
            .filter(|m| filter.matches(m.status()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.messages.read().iter().map(|m| m.timestamp()).max()
    }
}
