use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSourceKind {
    File,
    Directory,
}

/// Runtime status of a source, mutated only by the Tailing Engine (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceStatus {
    Inactive,
    Active,
    Error,
}

impl Default for SourceStatus {
    fn default() -> Self {
        SourceStatus::Inactive
    }
}

/// Fields owned exclusively by the Tailing Engine; all other readers take a
/// snapshot copy rather than holding a reference (spec §5, shared-resource
/// policy).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSourceRuntime {
    pub status: SourceStatus,
    pub last_monitored_at: Option<DateTime<Utc>>,
    pub known_size: u64,
    pub last_offset: u64,
    pub last_error: Option<String>,
}

impl LogSourceRuntime {
    /// Invariant (spec §3): `last_offset <= known_size` except mid-rotation.
    pub fn is_consistent(&self) -> bool {
        self.last_offset <= self.known_size
    }
}

/// Configuration of one monitored target (spec §3). `name` is the unique key
/// used to address the source through `TailingEngine` and in checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSource {
    pub name: String,
    pub path: PathBuf,
    pub kind: LogSourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Only meaningful for `Kind::Directory`.
    #[serde(default)]
    pub recursive: bool,
    /// Glob pattern for directory sources, e.g. `*.log`.
    #[serde(default)]
    pub file_pattern: Option<String>,
    /// `None` means "use the tailing engine's configured
    /// `default_polling_interval_ms`"; a source only overrides it by setting
    /// this explicitly.
    #[serde(default)]
    pub polling_interval_ms: Option<u64>,
    #[serde(default)]
    pub batch_hint: Option<usize>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing)]
    pub runtime: LogSourceRuntime,
}

fn default_true() -> bool {
    true
}

impl LogSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: LogSourceKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            enabled: true,
            recursive: false,
            file_pattern: None,
            polling_interval_ms: None,
            batch_hint: None,
            priority: Priority::default(),
            description: None,
            tags: Vec::new(),
            runtime: LogSourceRuntime::default(),
        }
    }

    /// Resolves this source's poll floor, falling back to
    /// `default_polling_interval_ms` (the engine's `[tailing]
    /// default_polling_interval_ms`) when the source didn't set its own.
    pub fn polling_interval(&self, default_polling_interval_ms: u64) -> Duration {
        Duration::from_millis(self.polling_interval_ms.unwrap_or(default_polling_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_runtime_is_consistent() {
        let s = LogSource::new("s1", "/var/log/a.log", LogSourceKind::File);
        assert!(s.runtime.is_consistent());
    }
}
