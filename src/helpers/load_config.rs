use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::model::LogSource;

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9000".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TailingConfig {
    /// Poll floor for any source whose own `polling_interval_ms` is unset;
    /// passed into `TailingEngine::new` and resolved per-source by
    /// `LogSource::polling_interval`.
    #[serde(default = "default_polling_interval_ms")]
    pub default_polling_interval_ms: u64,
    #[serde(default = "default_partial_line_hold_ms")]
    pub max_partial_line_hold_ms: u64,
    #[serde(default)]
    pub sources: Vec<LogSource>,
}

fn default_polling_interval_ms() -> u64 {
    1_000
}

fn default_partial_line_hold_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    #[serde(default = "default_backpressure_threshold")]
    pub backpressure_threshold: f64,
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

fn default_max_queue_size() -> usize {
    10_000
}
fn default_batch_size() -> usize {
    100
}
fn default_min_batch_size() -> usize {
    1
}
fn default_max_batch_size() -> usize {
    1_000
}
fn default_batch_timeout_ms() -> u64 {
    5_000
}
fn default_max_concurrent_batches() -> usize {
    5
}
fn default_backpressure_threshold() -> f64 {
    0.8
}
fn default_stats_interval_ms() -> u64 {
    30_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            batch_size: default_batch_size(),
            min_batch_size: default_min_batch_size(),
            max_batch_size: default_max_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_concurrent_batches: default_max_concurrent_batches(),
            backpressure_threshold: default_backpressure_threshold(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FanoutConfig {
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,
    #[serde(default = "default_per_subscriber_queue")]
    pub per_subscriber_queue: usize,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    #[serde(default = "default_slow_subscriber_threshold")]
    pub slow_subscriber_threshold: u32,
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: String,
}

fn default_max_subscribers() -> usize {
    100
}
fn default_per_subscriber_queue() -> usize {
    256
}
fn default_ping_interval_ms() -> u64 {
    30_000
}
fn default_pong_timeout_ms() -> u64 {
    60_000
}
fn default_slow_subscriber_threshold() -> u32 {
    100
}
fn default_grpc_addr() -> String {
    "[::1]:50061".to_string()
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_subscribers: default_max_subscribers(),
            per_subscriber_queue: default_per_subscriber_queue(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            slow_subscriber_threshold: default_slow_subscriber_threshold(),
            grpc_addr: default_grpc_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_adaptive_enabled")]
    pub adaptive_enabled: bool,
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    #[serde(default = "default_rolling_window_size")]
    pub rolling_window_size: usize,
}

fn default_sample_interval_ms() -> u64 {
    30_000
}
fn default_adaptive_enabled() -> bool {
    true
}
fn default_health_check_timeout_ms() -> u64 {
    10_000
}
fn default_rolling_window_size() -> usize {
    100
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            adaptive_enabled: default_adaptive_enabled(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            rolling_window_size: default_rolling_window_size(),
        }
    }
}

/// Matches the teacher's `DurabilityConfig::{InMemory, SQLite}` shape
/// (`helpers::load_config::DurabilityConfig` in `services/log-collector`),
/// repurposed here for per-source checkpoint storage (§10.6).
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum PersistenceBackend {
    Json { path: String },
    Sqlite { path: String },
}

impl Default for PersistenceBackend {
    fn default() -> Self {
        PersistenceBackend::Json {
            path: "./threatlens-checkpoints.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(flatten)]
    pub backend: PersistenceBackend,
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,
}

fn default_checkpoint_interval_ms() -> u64 {
    10_000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfigOrDefault,
    #[serde(default)]
    pub tailing: TailingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Thin wrapper so `[general]` can be entirely absent from a config file
/// without requiring `Option<GeneralConfig>` plumbing at every use site.
pub type GeneralConfigOrDefault = GeneralConfig;

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            tailing: TailingConfig::default(),
            queue: QueueConfig::default(),
            fanout: FanoutConfig::default(),
            controller: ControllerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path` as TOML, then layers environment overrides on top using
    /// the `config` crate (`THREATLENS_` prefix, `__` as the nesting
    /// separator, e.g. `THREATLENS_QUEUE__BATCH_SIZE=200`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("THREATLENS")
                    .separator("__")
                    .try_parsing(true),
            );

        let layered = builder
            .build()
            .with_context(|| format!("loading configuration from {}", path.display()))?;

        layered
            .try_deserialize()
            .context("deserializing layered configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let cfg = Config::default();
        assert_eq!(cfg.queue.max_queue_size, 10_000);
        assert_eq!(cfg.queue.batch_size, 100);
        assert_eq!(cfg.queue.max_concurrent_batches, 5);
        assert!((cfg.queue.backpressure_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.fanout.max_subscribers, 100);
        assert_eq!(cfg.fanout.per_subscriber_queue, 256);
        assert_eq!(cfg.fanout.slow_subscriber_threshold, 100);
        assert!(cfg.controller.adaptive_enabled);
    }
}
