//! Message record content and the status values a record moves through.
//!
//! The mutable half of a record (its status) lives with the scheduler; this module only
//! carries the immutable content and the status vocabulary so both can be persisted.

use chrono::{DateTime, Datelike, FixedOffset, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseStatusError {
    #[error("Unknown message status: {0}")]
    Unknown(String),
    #[error("ALL is a query filter and cannot be stored on a record")]
    FilterOnly,
}

/// Where a record is in its print lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    #[default]
    NotPrinted,
    Queued,
    Printing,
    Printed,
    Error,
    /// Inert record kept for history. Older session files call this `DELETED`.
    #[serde(alias = "DELETED")]
    Removed,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 6] = [
        MessageStatus::NotPrinted,
        MessageStatus::Queued,
        MessageStatus::Printing,
        MessageStatus::Printed,
        MessageStatus::Error,
        MessageStatus::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::NotPrinted => "NOT_PRINTED",
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Printing => "PRINTING",
            MessageStatus::Printed => "PRINTED",
            MessageStatus::Error => "ERROR",
            MessageStatus::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "NOT_PRINTED" => Ok(MessageStatus::NotPrinted),
            "QUEUED" => Ok(MessageStatus::Queued),
            "PRINTING" => Ok(MessageStatus::Printing),
            "PRINTED" => Ok(MessageStatus::Printed),
            "ERROR" => Ok(MessageStatus::Error),
            "REMOVED" | "DELETED" => Ok(MessageStatus::Removed),
            "ALL" => Err(ParseStatusError::FilterOnly),
            _ => Err(ParseStatusError::Unknown(s.to_string())),
        }
    }
}

/// Query-side view of a status: `All` matches everything that has not been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(MessageStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: MessageStatus) -> bool {
        match self {
            StatusFilter::All => status != MessageStatus::Removed,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<MessageStatus>() {
            Ok(status) => Ok(StatusFilter::Only(status)),
            Err(ParseStatusError::FilterOnly) => Ok(StatusFilter::All),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("ALL"),
            StatusFilter::Only(status) => status.fmt(f),
        }
    }
}

/// The identity-bearing fields of a message. Two records are the same record when these match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageContent {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub author: String,
    /// Normalised to the sheet's timezone, offset preserved.
    pub timestamp: DateTime<FixedOffset>,
}

impl MessageContent {
    pub fn weekday(&self) -> Weekday {
        self.timestamp.weekday()
    }

    /// 1 = Monday .. 7 = Sunday
    pub fn day_number(&self) -> u8 {
        self.weekday().number_from_monday() as u8
    }
}
