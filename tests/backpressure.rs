//! Backpressure admission and recovery (spec §8, scenario 3 and the
//! exact-threshold boundary case).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;

use threatlens_core::helpers::load_config::QueueConfig;
use threatlens_core::model::{LogEntry, Priority};
use threatlens_core::queue::{EnqueueOutcome, IngestionQueue};

fn queue_config() -> QueueConfig {
    QueueConfig {
        max_queue_size: 10,
        batch_size: 1,
        min_batch_size: 1,
        max_batch_size: 10,
        batch_timeout_ms: 20,
        max_concurrent_batches: 1,
        backpressure_threshold: 0.8,
        stats_interval_ms: 20,
    }
}

fn entry(priority: Priority) -> LogEntry {
    LogEntry::new("log line".into(), "/var/log/a.log".into(), "s1".into(), Utc::now(), priority, 0)
}

#[tokio::test]
async fn only_low_and_below_priority_rejected_at_threshold() {
    let queue = IngestionQueue::new(queue_config());

    for _ in 0..8 {
        assert_eq!(queue.enqueue(entry(Priority::Low)).await, EnqueueOutcome::Accepted);
    }
    assert_eq!(queue.depth().await, 8);

    assert_eq!(queue.enqueue(entry(Priority::Low)).await, EnqueueOutcome::RejectedBackpressure);
    assert_eq!(queue.enqueue(entry(Priority::Critical)).await, EnqueueOutcome::Accepted);
    assert_eq!(queue.enqueue(entry(Priority::High)).await, EnqueueOutcome::Accepted);
    assert_eq!(queue.depth().await, 10);

    assert_eq!(queue.enqueue(entry(Priority::Critical)).await, EnqueueOutcome::RejectedFull);

    queue
        .set_batch_processor(Arc::new(|batch: Vec<LogEntry>| {
            Box::pin(async move {
                let _ = batch;
                Ok(())
            })
        }))
        .await;
    tokio::spawn(queue.clone().run());
    tokio::spawn(queue.clone().run_stats_sampler());

    timeout(Duration::from_secs(2), async {
        while queue.depth().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue did not drain");

    assert_eq!(
        queue.enqueue(entry(Priority::Low)).await,
        EnqueueOutcome::Accepted,
        "backpressure must clear once depth drops back below threshold"
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = queue.stats().await;
    assert!(!stats.backpressure_active);

    queue.shutdown().await;
}
