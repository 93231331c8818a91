use std::collections::HashMap;
use std::path::PathBuf;

use tracing::instrument;

use super::checkpoint::{CheckpointRecord, CheckpointStore};
use super::errors::PersistenceError;

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Single JSON file keyed by source name, written via a temp-file-then-
/// rename so a crash mid-write never corrupts the live checkpoint (atomic
/// on POSIX), grounded on the teacher's `watcher::Checkpoint` save/load
/// pair (`services/log-collector/src/watcher/watcher.rs`).
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CheckpointStore for JsonFileStore {
    #[instrument(name = "persistence::json_store::load_all", target = "persistence::json_store", skip(self))]
    fn load_all(&self) -> BoxFuture<'_, Result<HashMap<String, CheckpointRecord>, PersistenceError>> {
        Box::pin(async move {
            match tokio::fs::read(&self.path).await {
                Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
                Err(err) => Err(PersistenceError::Io {
                    path: self.path.display().to_string(),
                    source: err,
                }),
            }
        })
    }

    #[instrument(name = "persistence::json_store::save_all", target = "persistence::json_store", skip_all)]
    fn save_all(&self, records: HashMap<String, CheckpointRecord>) -> BoxFuture<'_, Result<(), PersistenceError>> {
        Box::pin(async move {
            let serialized = serde_json::to_vec_pretty(&records)?;
            let tmp_path = self.path.with_extension("tmp");
            tokio::fs::write(&tmp_path, serialized)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: tmp_path.display().to_string(),
                    source,
                })?;
            tokio::fs::rename(&tmp_path, &self.path)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: self.path.display().to_string(),
                    source,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("checkpoints.json"));

        let mut records = HashMap::new();
        records.insert(
            "s1".to_string(),
            CheckpointRecord {
                source_name: "s1".to_string(),
                last_offset: 128,
                known_size: 128,
                status: crate::model::SourceStatus::Active,
                last_error: None,
            },
        );

        store.save_all(records.clone()).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.get("s1").unwrap().last_offset, 128);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("missing.json"));
        let loaded = store.load_all().await.unwrap();
        assert!(loaded.is_empty());
    }
}
