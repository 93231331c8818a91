use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::health::{BoxFuture, HealthCheck, HealthCheckResult, HealthStatus};
use crate::fanout::FanoutBus;
use crate::queue::IngestionQueue;
use crate::tailing::TailingEngine;

/// Queue utilization thresholds adopted from the Python original's
/// `QueueProcessingHealthCheck` (spec §11): independent of, and
/// complementary to, `BackpressureThreshold`.
const QUEUE_WARNING_UTILIZATION: f64 = 0.70;
const QUEUE_CRITICAL_UTILIZATION: f64 = 0.90;

pub struct QueueHealthCheck {
    queue: Arc<IngestionQueue>,
}

impl QueueHealthCheck {
    pub fn new(queue: Arc<IngestionQueue>) -> Self {
        Self { queue }
    }
}

impl HealthCheck for QueueHealthCheck {
    fn name(&self) -> &str {
        "ingestion_queue"
    }

    fn check(&self) -> BoxFuture<'_, HealthCheckResult> {
        Box::pin(async move {
            let start = Instant::now();
            let stats = self.queue.stats().await;
            let max = self.queue.max_queue_size().max(1) as f64;
            let utilization = stats.total as f64 / max;

            let status = if utilization > QUEUE_CRITICAL_UTILIZATION || stats.error_rate > 0.10 {
                HealthStatus::Critical
            } else if utilization > QUEUE_WARNING_UTILIZATION {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };

            let mut metrics = HashMap::new();
            metrics.insert("utilization".to_string(), utilization);
            metrics.insert("error_rate".to_string(), stats.error_rate);
            metrics.insert("total".to_string(), stats.total as f64);

            HealthCheckResult {
                status,
                message: format!("queue at {:.1}% utilization", utilization * 100.0),
                metrics,
                latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            }
        })
    }
}

pub struct FanoutHealthCheck {
    bus: Arc<FanoutBus>,
    max_subscribers: usize,
}

impl FanoutHealthCheck {
    pub fn new(bus: Arc<FanoutBus>, max_subscribers: usize) -> Self {
        Self { bus, max_subscribers }
    }
}

impl HealthCheck for FanoutHealthCheck {
    fn name(&self) -> &str {
        "fanout_bus"
    }

    fn check(&self) -> BoxFuture<'_, HealthCheckResult> {
        Box::pin(async move {
            let start = Instant::now();
            let count = self.bus.subscriber_count().await;
            let utilization = count as f64 / self.max_subscribers.max(1) as f64;

            let status = if utilization >= 1.0 {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };

            let mut metrics = HashMap::new();
            metrics.insert("subscribers".to_string(), count as f64);

            HealthCheckResult {
                status,
                message: format!("{count} subscribers registered"),
                metrics,
                latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            }
        })
    }
}

pub struct TailingHealthCheck {
    engine: Arc<TailingEngine>,
}

impl TailingHealthCheck {
    pub fn new(engine: Arc<TailingEngine>) -> Self {
        Self { engine }
    }
}

impl HealthCheck for TailingHealthCheck {
    fn name(&self) -> &str {
        "tailing_engine"
    }

    fn check(&self) -> BoxFuture<'_, HealthCheckResult> {
        Box::pin(async move {
            let start = Instant::now();
            let status_snapshot = self.engine.status().await;

            let health = if status_snapshot.total_sources > 0
                && status_snapshot.error_sources == status_snapshot.total_sources
            {
                HealthStatus::Critical
            } else if status_snapshot.error_sources > 0 {
                HealthStatus::Warning
            } else {
                HealthStatus::Healthy
            };

            let mut metrics = HashMap::new();
            metrics.insert("total_sources".to_string(), status_snapshot.total_sources as f64);
            metrics.insert("active_sources".to_string(), status_snapshot.active_sources as f64);
            metrics.insert("error_sources".to_string(), status_snapshot.error_sources as f64);

            HealthCheckResult {
                status: health,
                message: format!(
                    "{}/{} sources active",
                    status_snapshot.active_sources, status_snapshot.total_sources
                ),
                metrics,
                latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            }
        })
    }
}
