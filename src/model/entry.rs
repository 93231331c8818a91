use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Priority levels for a `LogEntry`. Lower numeric value = higher priority,
/// matching the ingestion queue's ordering (spec §3, §4.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    Bulk = 5,
}

impl Priority {
    /// Whether this priority is allowed through while backpressure is active
    /// (spec §4.2.2: only `Priority <= HIGH` is accepted).
    pub fn survives_backpressure(self) -> bool {
        self <= Priority::High
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
            Priority::Bulk => "BULK",
        };
        f.write_str(s)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Lifecycle status of a `LogEntry`, enforced by the ingestion queue per the
/// state machine in spec §4.2.8. No code outside `queue` mutates this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

/// Stable identity of a `LogEntry`: `{sourceName}_{timestamp}_{fileOffset}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new(source_name: &str, timestamp: DateTime<Utc>, file_offset: u64) -> Self {
        Self(format!(
            "{source_name}_{}_{file_offset}",
            timestamp.format("%Y%m%d%H%M%S%.6f")
        ))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical log line, tracked through its processing lifecycle.
///
/// Invariants (spec §3):
/// - `entry_id` is unique within a single run.
/// - `status` transitions only along
///   `Pending -> Processing -> {Completed|Failed}`, and
///   `Failed -> Retrying -> Processing` while `retry_count < max_retries`.
/// - if `status == Completed`, `processing_completed_at` is set and is
///   `>= processing_started_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub entry_id: EntryId,
    pub content: String,
    pub source_path: String,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub file_offset: u64,

    pub status: Status,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_count: u32,
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(
        content: String,
        source_path: String,
        source_name: String,
        timestamp: DateTime<Utc>,
        priority: Priority,
        file_offset: u64,
    ) -> Self {
        let entry_id = EntryId::new(&source_name, timestamp, file_offset);
        Self {
            entry_id,
            content,
            source_path,
            source_name,
            timestamp,
            priority,
            file_offset,
            status: Status::Pending,
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            error_count: 0,
            last_error: None,
            created_at: Utc::now(),
            processing_started_at: None,
            processing_completed_at: None,
        }
    }

    /// `true` if `content` and `source_name` are non-empty, per the
    /// `InvalidEntry` rejection rule in spec §4.2.
    pub fn is_valid(&self) -> bool {
        !self.content.is_empty() && !self.source_name.is_empty()
    }

    pub fn mark_processing_started(&mut self) {
        self.status = Status::Processing;
        self.processing_started_at = Some(Utc::now());
    }

    pub fn mark_processing_completed(&mut self) {
        self.status = Status::Completed;
        self.processing_completed_at = Some(Utc::now());
    }

    pub fn mark_processing_failed(&mut self, error: impl Into<String>) {
        self.status = Status::Failed;
        self.last_error = Some(error.into());
        self.error_count += 1;
        self.processing_completed_at = Some(Utc::now());
    }

    pub fn can_retry(&self) -> bool {
        self.status == Status::Failed && self.retry_count < self.max_retries
    }

    /// Transition `Failed -> Retrying`, bumping `retry_count` and clearing
    /// the processing timestamps so the entry looks freshly re-queued.
    pub fn mark_for_retry(&mut self) {
        if self.can_retry() {
            self.status = Status::Retrying;
            self.retry_count += 1;
            self.processing_started_at = None;
            self.processing_completed_at = None;
        }
    }

    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.processing_started_at, self.processing_completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Total order over entries: `(priority ascending, timestamp ascending)`,
/// per spec §4.2.1. This is the order the priority queue dequeues in.
impl PartialEq for LogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.timestamp == other.timestamp
    }
}

impl Eq for LogEntry {}

impl PartialOrd for LogEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(priority: Priority, offset: u64) -> LogEntry {
        LogEntry::new(
            "line".into(),
            "/var/log/a.log".into(),
            "s1".into(),
            Utc::now(),
            priority,
            offset,
        )
    }

    #[test]
    fn higher_priority_sorts_first() {
        let high = entry(Priority::High, 0);
        let low = entry(Priority::Low, 0);
        assert!(high < low);
    }

    #[test]
    fn same_priority_orders_by_timestamp() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::milliseconds(5);
        let a = LogEntry::new("a".into(), "p".into(), "s".into(), t0, Priority::Medium, 0);
        let b = LogEntry::new("b".into(), "p".into(), "s".into(), t1, Priority::Medium, 1);
        assert!(a < b);
    }

    #[test]
    fn retry_bounded_by_max_retries() {
        let mut e = entry(Priority::Medium, 0);
        e.mark_processing_started();
        for _ in 0..e.max_retries {
            e.mark_processing_failed("boom");
            assert!(e.can_retry());
            e.mark_for_retry();
        }
        e.mark_processing_failed("boom");
        assert!(!e.can_retry());
        assert_eq!(e.retry_count, e.max_retries);
    }

    #[test]
    fn invalid_entry_detection() {
        let mut e = entry(Priority::Medium, 0);
        e.content.clear();
        assert!(!e.is_valid());
    }
}
