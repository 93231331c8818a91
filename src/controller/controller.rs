use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::checks::{FanoutHealthCheck, QueueHealthCheck, TailingHealthCheck};
use super::health::{HealthCheck, HealthCheckResult, HealthStatus};
use super::system_metrics::{SystemMetricsSampler, SystemSample};
use crate::fanout::FanoutBus;
use crate::helpers::load_config::ControllerConfig;
use crate::metrics::metrics::CONTROLLER_AGGREGATE_STATUS;
use crate::queue::IngestionQueue;
use crate::tailing::TailingEngine;

const RATE_LIMIT: Duration = Duration::from_secs(60);
const CONSECUTIVE_SAMPLES: usize = 2;
const CPU_HIGH_THRESHOLD: f64 = 90.0;
const MEMORY_HIGH_THRESHOLD: f64 = 90.0;
const LATENCY_HIGH_MS: f64 = 5_000.0;
const QUEUE_HEALTHY_UTILIZATION: f64 = 0.20;
const TREND_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub overall: HealthStatus,
    pub components: HashMap<String, HealthCheckResult>,
    pub system: Option<SystemSample>,
    /// Supplemented feature (spec §11, `_calculate_trend` in the Python
    /// original): whether aggregate status has been trending up, down, or
    /// flat across the last few samples.
    pub trend: Trend,
    pub sampled_at: DateTime<Utc>,
}

/// Health & Adaptive Controller (spec §4.4). One-way dependency on the
/// other components: it calls their `HealthCheck`/tuning setters, never
/// holds onto their internals directly (spec §9 design note).
pub struct Controller {
    config: ControllerConfig,
    checks: Vec<Arc<dyn HealthCheck>>,
    queue: Arc<IngestionQueue>,
    bus: Arc<FanoutBus>,
    system: SystemMetricsSampler,
    rate_limits: Mutex<HashMap<&'static str, Instant>>,
    status_history: Mutex<VecDeque<HealthStatus>>,
    summary: Mutex<HealthSummary>,
    memory_protective: AtomicBool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        queue: Arc<IngestionQueue>,
        bus: Arc<FanoutBus>,
        tailing: Arc<TailingEngine>,
        fanout_max_subscribers: usize,
    ) -> Arc<Self> {
        let checks: Vec<Arc<dyn HealthCheck>> = vec![
            Arc::new(QueueHealthCheck::new(queue.clone())),
            Arc::new(FanoutHealthCheck::new(bus.clone(), fanout_max_subscribers)),
            Arc::new(TailingHealthCheck::new(tailing)),
        ];
        let window_size = config.rolling_window_size;
        Arc::new(Self {
            config,
            checks,
            queue,
            bus,
            system: SystemMetricsSampler::new(window_size),
            rate_limits: Mutex::new(HashMap::new()),
            status_history: Mutex::new(VecDeque::with_capacity(TREND_WINDOW)),
            summary: Mutex::new(HealthSummary {
                overall: HealthStatus::Unknown,
                components: HashMap::new(),
                system: None,
                trend: Trend::Flat,
                sampled_at: Utc::now(),
            }),
            memory_protective: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub async fn health_summary(&self) -> HealthSummary {
        self.summary.lock().await.clone()
    }

    #[instrument(name = "controller::run", target = "controller::controller", skip_all, level = "debug")]
    pub async fn run(self: Arc<Self>) {
        let interval = Duration::from_millis(self.config.sample_interval_ms);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.cancel.cancelled() => break,
            }
            self.sample_once().await;
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn sample_once(&self) {
        let timeout = Duration::from_millis(self.config.health_check_timeout_ms);
        let futures = self.checks.iter().map(|check| {
            let check = check.clone();
            async move {
                let name = check.name().to_string();
                let result = match tokio::time::timeout(timeout, check.check()).await {
                    Ok(result) => result,
                    Err(_) => HealthCheckResult {
                        status: HealthStatus::Critical,
                        message: format!("{name} health check timed out"),
                        metrics: HashMap::new(),
                        latency_ms: timeout.as_secs_f64() * 1000.0,
                    },
                };
                (name, result)
            }
        });
        let results: Vec<(String, HealthCheckResult)> = futures::future::join_all(futures).await;

        let mut overall = HealthStatus::Healthy;
        let mut components = HashMap::new();
        for (name, result) in results {
            overall = overall.max(result.status);
            components.insert(name, result);
        }

        let system_sample = self.system.sample().await;

        if self.config.adaptive_enabled {
            self.apply_adaptive_actions(&components, &system_sample).await;
        }

        let trend = self.update_trend(overall).await;
        CONTROLLER_AGGREGATE_STATUS.set(match overall {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
            HealthStatus::Unknown => 3,
        });

        *self.summary.lock().await = HealthSummary {
            overall,
            components,
            system: Some(system_sample),
            trend,
            sampled_at: Utc::now(),
        };
    }

    async fn update_trend(&self, overall: HealthStatus) -> Trend {
        let mut history = self.status_history.lock().await;
        history.push_back(overall);
        while history.len() > TREND_WINDOW {
            history.pop_front();
        }
        if history.len() < 2 {
            return Trend::Flat;
        }
        let rank = |s: &HealthStatus| match s {
            HealthStatus::Healthy => 0i8,
            HealthStatus::Warning => 1,
            HealthStatus::Unknown => 2,
            HealthStatus::Critical => 3,
        };
        let first = rank(history.front().expect("checked len >= 2"));
        let last = rank(history.back().expect("checked len >= 2"));
        match last.cmp(&first) {
            std::cmp::Ordering::Greater => Trend::Up,
            std::cmp::Ordering::Less => Trend::Down,
            std::cmp::Ordering::Equal => Trend::Flat,
        }
    }

    /// Applies the spec §4.4 adaptive action table, each action
    /// independently rate-limited to one adjustment per component per 60s
    /// (spec §4.4, decided precedence in §12.3: no cross-action ordering).
    async fn apply_adaptive_actions(
        &self,
        components: &HashMap<String, HealthCheckResult>,
        _latest_system: &SystemSample,
    ) {
        if self.system.consecutive_above(CONSECUTIVE_SAMPLES, CPU_HIGH_THRESHOLD, |s| s.cpu_percent).await
            && self.try_act("cpu_high").await
        {
            self.queue.halve_batch_size();
        }

        // Entering the protective cap is itself rate-limited to one action
        // per 60s; leaving it is driven purely by memory having actually
        // dropped back below threshold, not by that cooldown — otherwise
        // the next sample (on the shorter `SampleInterval`) would see
        // `try_act` return false while pressure is still high and restore
        // the cap it just set.
        let memory_high = self
            .system
            .consecutive_above(CONSECUTIVE_SAMPLES, MEMORY_HIGH_THRESHOLD, |s| s.memory_percent)
            .await;
        if memory_high {
            if self.try_act("memory_high").await {
                self.queue.purge_completed(chrono::Duration::zero()).await;
                self.bus.cap_subscriber_queues(1);
            }
            self.memory_protective.store(true, Ordering::Relaxed);
        } else if self.memory_protective.swap(false, Ordering::Relaxed) {
            self.bus.restore_subscriber_queue_cap();
        }

        let queue_health = components.get("ingestion_queue");
        let error_rate = queue_health.and_then(|r| r.metrics.get("error_rate")).copied().unwrap_or(0.0);
        if error_rate > 0.10 {
            tracing::error!(error_rate, "queue error rate exceeds 10%; no autonomous change applied");
        }

        let stats = self.queue.stats().await;
        if stats.avg_processing_time_ms > LATENCY_HIGH_MS && self.try_act("latency_high").await {
            self.queue.increase_max_concurrent_batches();
        }

        let utilization = stats.total as f64 / self.queue.max_queue_size().max(1) as f64;
        let throughput_healthy = stats.error_rate < 0.01 && utilization < QUEUE_HEALTHY_UTILIZATION;
        if throughput_healthy
            && stats.avg_processing_time_ms < LATENCY_HIGH_MS
            && self.try_act("grow_batch").await
        {
            self.queue.grow_batch_size();
        }
    }

    async fn try_act(&self, component: &'static str) -> bool {
        let mut limits = self.rate_limits.lock().await;
        let now = Instant::now();
        match limits.get(component) {
            Some(last) if now.duration_since(*last) < RATE_LIMIT => false,
            _ => {
                limits.insert(component, now);
                true
            }
        }
    }
}
