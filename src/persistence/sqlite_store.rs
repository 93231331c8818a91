use std::collections::HashMap;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::instrument;

use super::checkpoint::{CheckpointRecord, CheckpointStore};
use super::errors::PersistenceError;
use crate::model::SourceStatus;

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// One row per source, upserted at each checkpoint interval. Gives the
/// teacher's `r2d2`/`rusqlite` dependencies (declared there for the
/// buffer's SQLite durability mode) a job backing checkpoint durability
/// instead (spec §10.6).
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self, PersistenceError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::new(manager)?;
        {
            let conn = pool.get()?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS checkpoints (
                    source_name TEXT PRIMARY KEY,
                    last_offset INTEGER NOT NULL,
                    known_size  INTEGER NOT NULL,
                    status      TEXT NOT NULL,
                    last_error  TEXT
                )",
                [],
            )?;
        }
        Ok(Self { pool })
    }
}

fn status_to_str(status: SourceStatus) -> &'static str {
    match status {
        SourceStatus::Inactive => "INACTIVE",
        SourceStatus::Active => "ACTIVE",
        SourceStatus::Error => "ERROR",
    }
}

fn status_from_str(raw: &str) -> SourceStatus {
    match raw {
        "ACTIVE" => SourceStatus::Active,
        "ERROR" => SourceStatus::Error,
        _ => SourceStatus::Inactive,
    }
}

impl CheckpointStore for SqliteStore {
    #[instrument(name = "persistence::sqlite_store::load_all", target = "persistence::sqlite_store", skip(self))]
    fn load_all(&self) -> BoxFuture<'_, Result<HashMap<String, CheckpointRecord>, PersistenceError>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let conn = pool.get()?;
                let mut stmt = conn.prepare(
                    "SELECT source_name, last_offset, known_size, status, last_error FROM checkpoints",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(CheckpointRecord {
                        source_name: row.get(0)?,
                        last_offset: row.get::<_, i64>(1)? as u64,
                        known_size: row.get::<_, i64>(2)? as u64,
                        status: status_from_str(&row.get::<_, String>(3)?),
                        last_error: row.get(4)?,
                    })
                })?;
                let mut out = HashMap::new();
                for row in rows {
                    let record = row?;
                    out.insert(record.source_name.clone(), record);
                }
                Ok(out)
            })
            .await?
        })
    }

    #[instrument(name = "persistence::sqlite_store::save_all", target = "persistence::sqlite_store", skip_all)]
    fn save_all(&self, records: HashMap<String, CheckpointRecord>) -> BoxFuture<'_, Result<(), PersistenceError>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let mut conn = pool.get()?;
                let tx = conn.transaction()?;
                for record in records.values() {
                    tx.execute(
                        "INSERT INTO checkpoints (source_name, last_offset, known_size, status, last_error)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(source_name) DO UPDATE SET
                            last_offset = excluded.last_offset,
                            known_size = excluded.known_size,
                            status = excluded.status,
                            last_error = excluded.last_error",
                        rusqlite::params![
                            record.source_name,
                            record.last_offset as i64,
                            record.known_size as i64,
                            status_to_str(record.status),
                            record.last_error,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?
        })
    }
}
