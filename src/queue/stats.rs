use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Priority;

/// Observable snapshot of queue state (spec §4.2.5). Cheap to read: refreshed
/// by a dedicated sampler on `StatsInterval`, not recomputed per-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: u64,
    pub failed: u64,
    pub priority_distribution: HashMap<Priority, u64>,
    pub avg_processing_time_ms: f64,
    pub min_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
    pub throughput_per_second: f64,
    pub error_rate: f64,
    pub retry_count: u64,
    pub dropped_count: u64,
    pub backpressure_active: bool,
    pub last_updated: DateTime<Utc>,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            total: 0,
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            priority_distribution: HashMap::new(),
            avg_processing_time_ms: 0.0,
            min_processing_time_ms: 0.0,
            max_processing_time_ms: 0.0,
            throughput_per_second: 0.0,
            error_rate: 0.0,
            retry_count: 0,
            dropped_count: 0,
            backpressure_active: false,
            last_updated: Utc::now(),
        }
    }
}

/// Rolling processing-time sample. The Python original
/// (`app/realtime/ingestion_queue.py`) keeps `_processing_times` capped at
/// 1000 and, on overflow, trims to the last 500 rather than popping one at a
/// time — cheaper under sustained load since the trim happens O(1) times per
/// 500 insertions instead of evicting on every push. Adopted verbatim here
/// (§11).
#[derive(Debug, Default)]
pub struct ProcessingTimeSample {
    samples_ms: VecDeque<f64>,
}

const SAMPLE_CAP: usize = 1_000;
const SAMPLE_TRIM_TO: usize = 500;

impl ProcessingTimeSample {
    pub fn record(&mut self, duration_ms: f64) {
        self.samples_ms.push_back(duration_ms);
        if self.samples_ms.len() > SAMPLE_CAP {
            let excess = self.samples_ms.len() - SAMPLE_TRIM_TO;
            self.samples_ms.drain(0..excess);
        }
    }

    pub fn avg(&self) -> f64 {
        if self.samples_ms.is_empty() {
            return 0.0;
        }
        self.samples_ms.iter().sum::<f64>() / self.samples_ms.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.samples_ms.iter().cloned().fold(f64::INFINITY, f64::min).max(0.0)
    }

    pub fn max(&self) -> f64 {
        self.samples_ms.iter().cloned().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_to_half_on_overflow() {
        let mut sample = ProcessingTimeSample::default();
        for i in 0..(SAMPLE_CAP + 1) {
            sample.record(i as f64);
        }
        assert_eq!(sample.samples_ms.len(), SAMPLE_TRIM_TO);
    }
}
