use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::HistoryMessage;
use crate::schedule::{DeadlineInstants, DeadlineSchedule};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("channel history holds no countable messages")]
    Empty,
}

/// Portable snapshot of a community's squad records, for export and import.
/// Buckets are ordered by deadline instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataExport {
    pub buckets: Vec<ExportBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBucket {
    pub deadline: DateTime<Utc>,
    pub reports: Vec<ExportItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportItem {
    pub member_id: u64,
    pub message_id: u64,
    pub instant: DateTime<Utc>,
}

/// One countable message attributed to a deadline bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub member_id: u64,
    pub message_id: u64,
    pub instant: DateTime<Utc>,
}

/// A deadline occurrence and the first message per member that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBucket {
    pub deadline: DateTime<Utc>,
    pub entries: Vec<HistoryEntry>,
}

/// Walks the deadline sequence alongside a message stream, closing one
/// bucket and opening the next whenever a message lands past the current
/// deadline. Buckets that collected nothing are dropped, so quiet weeks in
/// an old channel do not produce empty deadline rows.
struct BucketCursor {
    instants: DeadlineInstants,
    current: DateTime<Utc>,
    seen: HashSet<u64>,
    entries: Vec<HistoryEntry>,
    buckets: Vec<HistoryBucket>,
}

impl BucketCursor {
    fn start(schedule: &DeadlineSchedule, first_message: DateTime<Utc>) -> Option<Self> {
        let start_date = first_message.with_timezone(&schedule.timezone()).date_naive();
        let mut instants = schedule.instants(Some(start_date));
        let current = instants.next()?;
        Some(Self {
            instants,
            current,
            seen: HashSet::new(),
            entries: Vec::new(),
            buckets: Vec::new(),
        })
    }

    fn push(&mut self, message: &HistoryMessage) {
        while message.timestamp > self.current {
            self.advance();
        }
        // only the first message per member counts for a given week
        if self.seen.insert(message.author_id) {
            self.entries.push(HistoryEntry {
                member_id: message.author_id,
                message_id: message.message_id,
                instant: message.timestamp,
            });
        }
    }

    fn advance(&mut self) {
        self.flush();
        self.seen.clear();
        if let Some(next) = self.instants.next() {
            self.current = next;
        }
    }

    fn flush(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.buckets.push(HistoryBucket {
            deadline: self.current,
            entries: std::mem::take(&mut self.entries),
        });
    }

    fn finish(mut self) -> Vec<HistoryBucket> {
        self.flush();
        self.buckets
    }
}

/// Reconstructs deadline buckets from raw channel history. Bot posts and
/// vetoed messages are never counted.
pub fn bucket_history(
    schedule: &DeadlineSchedule,
    messages: &[HistoryMessage],
) -> Result<Vec<HistoryBucket>, HistoryError> {
    let mut countable: Vec<&HistoryMessage> = messages
        .iter()
        .filter(|m| !m.from_bot && !m.vetoed)
        .collect();
    countable.sort_by_key(|m| m.timestamp);

    let first = countable.first().ok_or(HistoryError::Empty)?;
    let mut cursor =
        BucketCursor::start(schedule, first.timestamp).ok_or(HistoryError::Empty)?;
    for message in &countable {
        cursor.push(message);
    }
    Ok(cursor.finish())
}
