//! Analyzer seam (spec §1: "AI/ML analyzer content, treated as an opaque
//! `Analyzer` function returning `AnalysisResult`"). This crate owns the
//! batch processor call site (`queue::ingestion::BatchProcessor`); the
//! concrete analysis logic lives outside it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EntryId, LogEntry, Priority};

/// Outcome of analyzing one batch of log entries. Mirrors the shape the
/// fan-out bus expects to turn into an `EventUpdate` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub entry_id: EntryId,
    pub event_type: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl AnalysisResult {
    pub fn new(entry: &LogEntry, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            entry_id: entry.entry_id.clone(),
            event_type: event_type.into(),
            priority: entry.priority,
            timestamp: Utc::now(),
            payload,
            metadata: HashMap::new(),
        }
    }
}

/// Boxed-future seam for whatever analysis engine is wired in by the binary
/// that embeds this crate (spec §1 Non-goals: analyzer content is out of
/// scope here). Matches the manual async-closure idiom used by
/// `queue::ingestion::BatchProcessor` rather than pulling in `async-trait`
/// for a single callback type.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub trait Analyzer: Send + Sync {
    fn analyze(&self, batch: Vec<LogEntry>) -> BoxFuture<'_, Result<Vec<AnalysisResult>, String>>;
}
