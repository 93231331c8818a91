use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Per-component health status (spec §4.4). Ranked `Healthy < Warning <
/// Unknown < Critical` for aggregation purposes: "if any component is
/// UNKNOWN and none is worse [than CRITICAL], overall is UNKNOWN" only
/// holds if UNKNOWN outranks WARNING/HEALTHY but not CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unknown,
    Critical,
}

impl HealthStatus {
    fn rank(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Unknown => 2,
            HealthStatus::Critical => 3,
        }
    }

    pub fn max(self, other: HealthStatus) -> HealthStatus {
        if self.rank() >= other.rank() { self } else { other }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    pub metrics: HashMap<String, f64>,
    pub latency_ms: f64,
}

impl HealthCheckResult {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
            metrics: HashMap::new(),
            latency_ms: 0.0,
        }
    }

    pub fn with_metrics(mut self, metrics: HashMap<String, f64>) -> Self {
        self.metrics = metrics;
        self
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Implemented by every component the Controller samples (spec §4.4).
/// Boxed-future return rather than `async-trait`, matching
/// `queue::ingestion`'s callback convention — keeps this crate's only
/// async-in-traits dependency to tonic's generated service traits.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> BoxFuture<'_, HealthCheckResult>;
}
