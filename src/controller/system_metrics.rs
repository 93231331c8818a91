use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use tokio::sync::Mutex;

use crate::metrics::metrics::{SYSTEM_CPU_PERCENT, SYSTEM_MEMORY_PERCENT};

/// One sample of the Controller's system-metrics window (spec §4.4:
/// "Sample CPU %, memory %, disk %, load average on a fixed interval").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub load_average_1m: f64,
    pub sampled_at: DateTime<Utc>,
}

/// Rolling window of `SystemSample`s, capped at `rolling_window_size`
/// (default 100, spec §4.4).
pub struct SystemMetricsSampler {
    system: Mutex<System>,
    window: Mutex<VecDeque<SystemSample>>,
    window_size: usize,
}

impl std::fmt::Debug for SystemMetricsSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMetricsSampler")
            .field("window_size", &self.window_size)
            .finish_non_exhaustive()
    }
}

impl SystemMetricsSampler {
    pub fn new(window_size: usize) -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            window: Mutex::new(VecDeque::with_capacity(window_size)),
            window_size,
        }
    }

    pub async fn sample(&self) -> SystemSample {
        let mut system = self.system.lock().await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_percent = system.global_cpu_usage() as f64;
        let memory_percent = if system.total_memory() > 0 {
            system.used_memory() as f64 / system.total_memory() as f64 * 100.0
        } else {
            0.0
        };

        let disks = Disks::new_with_refreshed_list();
        let (total_disk, used_disk) = disks.iter().fold((0u64, 0u64), |(total, used), disk| {
            let disk_total = disk.total_space();
            let disk_used = disk_total.saturating_sub(disk.available_space());
            (total + disk_total, used + disk_used)
        });
        let disk_percent = if total_disk > 0 {
            used_disk as f64 / total_disk as f64 * 100.0
        } else {
            0.0
        };

        let load_average_1m = System::load_average().one;

        let sample = SystemSample {
            cpu_percent,
            memory_percent,
            disk_percent,
            load_average_1m,
            sampled_at: Utc::now(),
        };

        SYSTEM_CPU_PERCENT.set(cpu_percent);
        SYSTEM_MEMORY_PERCENT.set(memory_percent);

        let mut window = self.window.lock().await;
        window.push_back(sample);
        while window.len() > self.window_size {
            window.pop_front();
        }

        sample
    }

    /// Average CPU% over the last `count` samples (used by the Controller's
    /// "2 consecutive samples" adaptive triggers).
    pub async fn recent_avg_cpu(&self, count: usize) -> f64 {
        let window = self.window.lock().await;
        avg_of_last(window.iter().map(|s| s.cpu_percent), count)
    }

    pub async fn recent_avg_memory(&self, count: usize) -> f64 {
        let window = self.window.lock().await;
        avg_of_last(window.iter().map(|s| s.memory_percent), count)
    }

    pub async fn consecutive_above(&self, count: usize, threshold: f64, pick: impl Fn(&SystemSample) -> f64) -> bool {
        let window = self.window.lock().await;
        if window.len() < count {
            return false;
        }
        window.iter().rev().take(count).all(|s| pick(s) > threshold)
    }
}

fn avg_of_last(values: impl DoubleEndedIterator<Item = f64>, count: usize) -> f64 {
    let last: Vec<f64> = values.rev().take(count).collect();
    if last.is_empty() {
        return 0.0;
    }
    last.iter().sum::<f64>() / last.len() as f64
}
