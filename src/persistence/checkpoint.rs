use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::errors::PersistenceError;
use crate::model::SourceStatus;

/// Durable per-source offset record (spec §6: "`LastOffset`, `KnownSize`,
/// `Status`, `LastError`. Stored in a key-value file or table keyed by
/// source `Name`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub source_name: String,
    pub last_offset: u64,
    pub known_size: u64,
    pub status: SourceStatus,
    pub last_error: Option<String>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage backend for per-source checkpoints (spec §6, open question
/// resolved in §10.6/§12.2: backend is pluggable, JSON by default).
pub trait CheckpointStore: Send + Sync {
    fn load_all(&self) -> BoxFuture<'_, Result<HashMap<String, CheckpointRecord>, PersistenceError>>;
    fn save_all(
        &self,
        records: HashMap<String, CheckpointRecord>,
    ) -> BoxFuture<'_, Result<(), PersistenceError>>;
}
