//! Message import from the form-response sheet.
//!
//! The sheet is read from a JSON export: an array of rows, the first being the header, each
//! row `[timestamp, subject, body, recipient, author]`. Timestamps look like
//! `24.4.2025 klo 14.08.47` and are local to the configured timezone.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use leiriposti_shared::MessageContent;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Row {row} is missing the {field} column")]
    MissingField { row: usize, field: &'static str },
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait MessageSource: Send {
    /// Messages that arrived since the previous call.
    async fn fetch_new(&mut self) -> Result<Vec<MessageContent>, SourceError>;

    /// Sheet row number of the last row consumed; the header is row 1.
    fn last_row(&self) -> usize;
}

pub struct SheetRowSource {
    path: PathBuf,
    timezone: Tz,
    last_row: usize,
}

impl SheetRowSource {
    /// `last_row` is where a previous session stopped; values below 1 start after the header.
    pub fn new(path: impl AsRef<Path>, timezone: &str, last_row: usize) -> Result<Self, SourceError> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| SourceError::UnknownTimezone(timezone.to_string()))?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            timezone,
            last_row: last_row.max(1),
        })
    }
}

#[async_trait]
impl MessageSource for SheetRowSource {
    async fn fetch_new(&mut self) -> Result<Vec<MessageContent>, SourceError> {
        let data = tokio::fs::read_to_string(&self.path).await?;
        let rows: Vec<Vec<String>> = serde_json::from_str(&data)?;

        let mut messages = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            if row_number <= self.last_row {
                continue;
            }
            match message_from_row(row_number, row, self.timezone) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!("Skipping sheet row {}: {}", row_number, e),
            }
            self.last_row = row_number;
        }

        if messages.is_empty() {
            tracing::info!("No new messages found");
        } else {
            tracing::info!("New messages retrieved: {}", messages.len());
        }
        Ok(messages)
    }

    fn last_row(&self) -> usize {
        self.last_row
    }
}

pub fn message_from_row(row_number: usize, row: &[String], timezone: Tz) -> Result<MessageContent, SourceError> {
    let field = |index: usize, name: &'static str| {
        row.get(index)
            .map(|s| s.trim().to_string())
            .ok_or(SourceError::MissingField { row: row_number, field: name })
    };
    Ok(MessageContent {
        timestamp: parse_sheet_timestamp(&field(0, "timestamp")?, timezone)?,
        subject: field(1, "subject")?,
        body: field(2, "body")?,
        recipient: field(3, "recipient")?,
        author: field(4, "author")?,
    })
}

/// Parse `d.M.yyyy klo H.mm.ss` as local time in `timezone`.
pub fn parse_sheet_timestamp(value: &str, timezone: Tz) -> Result<DateTime<FixedOffset>, SourceError> {
    let invalid = || SourceError::InvalidTimestamp(value.to_string());

    let (date, time) = value.trim().split_once(" klo ").ok_or_else(invalid)?;
    let [day, month, year] = split_numbers::<3>(date).ok_or_else(invalid)?;
    let [hour, minute, second] = split_numbers::<3>(time).ok_or_else(invalid)?;

    let date = NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)?;
    timezone
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(invalid)
}

fn split_numbers<const N: usize>(value: &str) -> Option<[u32; N]> {
    let mut out = [0; N];
    let mut parts = value.trim().split('.');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}
