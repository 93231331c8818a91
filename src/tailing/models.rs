use serde::{Deserialize, Serialize};

use crate::model::SourceStatus;

/// One entry of `TailingEngine::Status()`'s `perSource` map (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerSourceStatus {
    pub name: String,
    pub status: SourceStatus,
    pub known_size: u64,
    pub last_offset: u64,
    pub last_error: Option<String>,
}

/// Aggregate result of `TailingEngine::Status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub total_sources: usize,
    pub active_sources: usize,
    pub error_sources: usize,
    pub per_source: Vec<PerSourceStatus>,
}
