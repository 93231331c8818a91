//! Benchmarks the Priority Ingestion Queue's `Enqueue` path (spec §4.2)
//! under different priority mixes, grounded on the pipeline crate's
//! `file_io_benchmark.rs` (`tokio::runtime::Runtime` + `black_box` shape).

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use threatlens_core::helpers::load_config::QueueConfig;
use threatlens_core::model::{LogEntry, Priority};
use threatlens_core::queue::IngestionQueue;

fn queue_config(max_queue_size: usize) -> QueueConfig {
    QueueConfig {
        max_queue_size,
        batch_size: 100,
        min_batch_size: 1,
        max_batch_size: 1_000,
        batch_timeout_ms: 5_000,
        max_concurrent_batches: 5,
        backpressure_threshold: 0.8,
        stats_interval_ms: 30_000,
    }
}

fn entry(priority: Priority, offset: u64) -> LogEntry {
    LogEntry::new(
        "benchmark log line".to_string(),
        "/var/log/bench.log".to_string(),
        "bench-source".to_string(),
        Utc::now(),
        priority,
        offset,
    )
}

fn benchmark_enqueue_uncontended(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("enqueue_uncontended");

    for &priority in &[Priority::Critical, Priority::Medium, Priority::Bulk] {
        group.bench_with_input(
            BenchmarkId::from_parameter(priority.to_string()),
            &priority,
            |b, &priority| {
                b.iter(|| {
                    rt.block_on(async {
                        let queue = IngestionQueue::new(queue_config(10_000));
                        for i in 0..200u64 {
                            let outcome = queue.enqueue(entry(priority, i)).await;
                            black_box(outcome);
                        }
                    });
                });
            },
        );
    }
    group.finish();
}

fn benchmark_enqueue_near_backpressure(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("enqueue_near_backpressure");

    group.bench_function("mixed_priority_fill", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = IngestionQueue::new(queue_config(1_000));
                for i in 0..900u64 {
                    let priority = match i % 5 {
                        0 => Priority::Critical,
                        1 => Priority::High,
                        2 => Priority::Medium,
                        3 => Priority::Low,
                        _ => Priority::Bulk,
                    };
                    let outcome = queue.enqueue(entry(priority, i)).await;
                    black_box(outcome);
                }
            });
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_enqueue_uncontended,
    benchmark_enqueue_near_backpressure
);
criterion_main!(benches);
