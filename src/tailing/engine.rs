use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::instrument;

use super::discovery::expand_directory;
use super::errors::TailingError;
use super::models::{EngineStatus, PerSourceStatus};
use super::source_task::{self, Consumer, SourceHandle};
use crate::model::{LogSource, LogSourceKind, SourceStatus};

/// Tracks which child (expanded file) sources belong to a directory source,
/// so `RemoveSource(dir)` tears down every child it spawned.
#[derive(Debug, Default)]
struct DirectoryChildren {
    children: Vec<String>,
}

/// The File Tailing Engine (spec §4.1): owns one task per concrete file
/// being tailed, plus a lightweight discovery loop per directory source
/// that expands/contracts its children as files appear and disappear.
pub struct TailingEngine {
    max_partial_line_hold: Duration,
    /// `[tailing] default_polling_interval_ms`: the poll floor used by any
    /// source that doesn't set its own `polling_interval_ms` (spec §10.2).
    default_polling_interval_ms: u64,
    sources: Mutex<HashMap<String, SourceHandle>>,
    directories: Mutex<HashMap<String, (LogSource, DirectoryChildren)>>,
    consumer: Mutex<Option<Consumer>>,
}

impl std::fmt::Debug for TailingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailingEngine")
            .field("max_partial_line_hold", &self.max_partial_line_hold)
            .field("default_polling_interval_ms", &self.default_polling_interval_ms)
            .finish_non_exhaustive()
    }
}

impl TailingEngine {
    pub fn new(max_partial_line_hold: Duration, default_polling_interval_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            max_partial_line_hold,
            default_polling_interval_ms,
            sources: Mutex::new(HashMap::new()),
            directories: Mutex::new(HashMap::new()),
            consumer: Mutex::new(None),
        })
    }

    pub async fn set_consumer(&self, consumer: Consumer) {
        *self.consumer.lock().await = Some(consumer);
    }

    #[instrument(
        name = "threatlens_tailing_add_source",
        target = "tailing::engine",
        skip(self),
        level = "info"
    )]
    pub async fn add_source(&self, source: LogSource) -> Result<(), TailingError> {
        if self.sources.lock().await.contains_key(&source.name)
            || self.directories.lock().await.contains_key(&source.name)
        {
            return Err(TailingError::SourceExists(source.name));
        }

        match source.kind {
            LogSourceKind::File => {
                self.spawn_file_source(source).await?;
            }
            LogSourceKind::Directory => {
                if !source.path.is_dir() {
                    return Err(TailingError::Io {
                        path: source.path.display().to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "directory source path does not exist",
                        ),
                    });
                }
                let name = source.name.clone();
                let matches = expand_directory(&source)?;
                let mut children = DirectoryChildren::default();
                for path in matches {
                    let child_name = child_name(&name, &path);
                    let mut child = source.clone();
                    child.name = child_name.clone();
                    child.path = path;
                    child.kind = LogSourceKind::File;
                    if self.spawn_file_source(child).await.is_ok() {
                        children.children.push(child_name);
                    }
                }
                self.directories.lock().await.insert(name, (source, children));
            }
        }
        Ok(())
    }

    async fn spawn_file_source(&self, source: LogSource) -> Result<(), TailingError> {
        // A nonzero `runtime.last_offset` means the caller seeded this
        // source from a persisted checkpoint (spec §6: "on startup, values
        // are loaded"); otherwise fresh sources start at EOF and never
        // replay history (spec §4.1).
        let initial_offset = if source.runtime.last_offset > 0 {
            source.runtime.last_offset
        } else {
            tokio::fs::metadata(&source.path)
                .await
                .map(|m| m.len())
                .unwrap_or(0)
        };
        let consumer = self
            .consumer
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| Arc::new(|_entry| Box::pin(async { source_task::ConsumerOutcome::Accepted })));

        let name = source.name.clone();
        let handle = source_task::spawn(
            source,
            initial_offset,
            self.max_partial_line_hold,
            self.default_polling_interval_ms,
            consumer,
        );
        self.sources.lock().await.insert(name, handle);
        Ok(())
    }

    #[instrument(name = "threatlens_tailing_remove_source", target = "tailing::engine", skip(self))]
    pub async fn remove_source(&self, name: &str) -> bool {
        if let Some((_, children)) = self.directories.lock().await.remove(name) {
            for child in children.children {
                self.remove_single(&child).await;
            }
            return true;
        }
        self.remove_single(name).await
    }

    async fn remove_single(&self, name: &str) -> bool {
        if let Some(handle) = self.sources.lock().await.remove(name) {
            handle.cancel.cancel();
            let _ = handle.join.await;
            true
        } else {
            false
        }
    }

    /// Runs the poll-and-reconcile cycle for every directory source: newly
    /// matching files are spawned as children, vanished ones are torn down
    /// and their tail state discarded (spec §4.1: "Directory sources
    /// add/remove sub-sources dynamically").
    pub async fn rediscover_directories(&self) {
        let dir_names: Vec<String> = self.directories.lock().await.keys().cloned().collect();
        for dir_name in dir_names {
            let source = match self.directories.lock().await.get(&dir_name) {
                Some((s, _)) => s.clone(),
                None => continue,
            };
            let matched = match expand_directory(&source) {
                Ok(m) => m,
                Err(err) => {
                    tracing::warn!(source = %dir_name, error = %err, "directory rediscovery failed");
                    continue;
                }
            };
            let desired: Vec<String> = matched.iter().map(|p| child_name(&dir_name, p)).collect();

            let current = self
                .directories
                .lock()
                .await
                .get(&dir_name)
                .map(|(_, c)| c.children.clone())
                .unwrap_or_default();

            for stale in current.iter().filter(|c| !desired.contains(c)) {
                self.remove_single(stale).await;
            }

            for (path, name) in matched.iter().zip(desired.iter()) {
                if !current.contains(name) {
                    let mut child = source.clone();
                    child.name = name.clone();
                    child.path = path.clone();
                    child.kind = LogSourceKind::File;
                    let _ = self.spawn_file_source(child).await;
                }
            }

            if let Some(entry) = self.directories.lock().await.get_mut(&dir_name) {
                entry.1.children = desired;
            }
        }
    }

    pub async fn list_sources(&self) -> Vec<LogSource> {
        let mut out = Vec::new();
        for handle in self.sources.lock().await.values() {
            out.push(handle.source.lock().await.clone());
        }
        out
    }

    pub async fn status(&self) -> EngineStatus {
        let sources = self.sources.lock().await;
        let mut per_source = Vec::with_capacity(sources.len());
        let mut active = 0;
        let mut errored = 0;
        for handle in sources.values() {
            let s = handle.source.lock().await;
            match s.runtime.status {
                SourceStatus::Active => active += 1,
                SourceStatus::Error => errored += 1,
                SourceStatus::Inactive => {}
            }
            per_source.push(PerSourceStatus {
                name: s.name.clone(),
                status: s.runtime.status,
                known_size: s.runtime.known_size,
                last_offset: s.runtime.last_offset,
                last_error: s.runtime.last_error.clone(),
            });
        }
        EngineStatus {
            total_sources: sources.len(),
            active_sources: active,
            error_sources: errored,
            per_source,
        }
    }

    pub async fn shutdown(&self) {
        let names: Vec<String> = self.sources.lock().await.keys().cloned().collect();
        for name in names {
            self.remove_single(&name).await;
        }
        self.directories.lock().await.clear();
    }
}

fn child_name(parent: &str, path: &std::path::Path) -> String {
    format!("{parent}::{}", path.display())
}
