//! Prometheus metric definitions, grounded on
//! `services/log-collector/src/metrics/metrics.rs`'s `lazy_static!` registry
//! pattern, extended to cover every component named in spec §4.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntGauge, register_counter, register_gauge, register_histogram,
    register_int_gauge,
};

lazy_static! {
    // Ingestion Queue
    pub static ref QUEUE_DEPTH: IntGauge =
        register_int_gauge!("threatlens_queue_depth", "Entries currently held by the ingestion queue").unwrap();
    pub static ref QUEUE_THROUGHPUT_PER_SEC: Gauge = register_gauge!(
        "threatlens_queue_throughput_per_second",
        "Entries completed per second, sampled on StatsInterval"
    )
    .unwrap();
    pub static ref QUEUE_DROPPED_TOTAL: Counter = register_counter!(
        "threatlens_queue_dropped_total",
        "Entries rejected with RejectedFull or RejectedBackpressure"
    )
    .unwrap();
    pub static ref QUEUE_RETRIES_TOTAL: Counter =
        register_counter!("threatlens_queue_retries_total", "Entries re-enqueued for retry").unwrap();
    pub static ref QUEUE_BACKPRESSURE_ACTIVE: IntGauge = register_int_gauge!(
        "threatlens_queue_backpressure_active",
        "1 while the queue is in backpressure mode, else 0"
    )
    .unwrap();
    pub static ref QUEUE_PROCESSING_LATENCY_MS: Histogram = register_histogram!(
        "threatlens_queue_processing_latency_ms",
        "Batch processing duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap();

    // Fan-out Bus
    pub static ref FANOUT_SUBSCRIBERS: IntGauge =
        register_int_gauge!("threatlens_fanout_subscribers", "Currently registered subscribers").unwrap();
    pub static ref FANOUT_DELIVERED_TOTAL: Counter =
        register_counter!("threatlens_fanout_delivered_total", "Events delivered to subscribers").unwrap();
    pub static ref FANOUT_DROPPED_TOTAL: Counter = register_counter!(
        "threatlens_fanout_dropped_total",
        "Events dropped because a subscriber's outbound queue was full"
    )
    .unwrap();
    pub static ref FANOUT_DISCONNECTED_SLOW_TOTAL: Counter = register_counter!(
        "threatlens_fanout_disconnected_slow_total",
        "Subscribers force-disconnected for exceeding SlowSubscriberThreshold"
    )
    .unwrap();

    // Tailing Engine
    pub static ref TAILING_SOURCES_ACTIVE: IntGauge =
        register_int_gauge!("threatlens_tailing_sources_active", "Sources currently ACTIVE").unwrap();
    pub static ref TAILING_SOURCES_ERROR: IntGauge =
        register_int_gauge!("threatlens_tailing_sources_error", "Sources currently in ERROR").unwrap();
    pub static ref TAILING_LINES_TOTAL: Counter =
        register_counter!("threatlens_tailing_lines_total", "Lines produced across all sources").unwrap();

    // Controller / system
    pub static ref SYSTEM_CPU_PERCENT: Gauge =
        register_gauge!("threatlens_system_cpu_percent", "Average CPU utilization across cores").unwrap();
    pub static ref SYSTEM_MEMORY_PERCENT: Gauge =
        register_gauge!("threatlens_system_memory_percent", "Memory utilization percentage").unwrap();
    pub static ref CONTROLLER_AGGREGATE_STATUS: IntGauge = register_int_gauge!(
        "threatlens_controller_aggregate_status",
        "0=HEALTHY 1=WARNING 2=CRITICAL 3=UNKNOWN"
    )
    .unwrap();
}
