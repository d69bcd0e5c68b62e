//! FIFO print queue. A plain container: the scheduler lock is the only synchronisation.

use crate::message::{Message, MessageHandle};
use leiriposti_shared::MessageContent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct PrintQueue {
    records: VecDeque<MessageHandle>,
}

impl PrintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns false if an equal record is already queued.
    pub fn enqueue(&mut self, record: MessageHandle) -> bool {
        if self.contains(&record) {
            return false;
        }
        self.records.push_back(record);
        true
    }

    pub fn dequeue_next(&mut self) -> Option<MessageHandle> {
        self.records.pop_front()
    }

    /// Put a record back at the head, ahead of everything still waiting.
    pub fn requeue_front(&mut self, record: MessageHandle) -> bool {
        if self.contains(&record) {
            return false;
        }
        self.records.push_front(record);
        true
    }

    /// Remove the first record equal to `record`.
    pub fn remove(&mut self, record: &Message) -> bool {
        match self.records.iter().position(|queued| **queued == *record) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, record: &Message) -> bool {
        self.records.iter().any(|queued| **queued == *record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageHandle> {
        self.records.iter()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            records: self.records.iter().map(|r| r.content().clone()).collect(),
        }
    }
}

/// The queued records in FIFO order: the only scheduler state that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub records: Vec<MessageContent>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
