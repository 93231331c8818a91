//! Priority-discipline and retry invariants (spec §8, scenarios 2 and 4).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::timeout;

use threatlens_core::helpers::load_config::QueueConfig;
use threatlens_core::model::{LogEntry, Priority};
use threatlens_core::queue::IngestionQueue;

fn queue_config(batch_size: usize, max_queue_size: usize) -> QueueConfig {
    QueueConfig {
        max_queue_size,
        batch_size,
        min_batch_size: 1,
        max_batch_size: 10,
        batch_timeout_ms: 50,
        max_concurrent_batches: 2,
        backpressure_threshold: 0.8,
        stats_interval_ms: 20,
    }
}

fn entry_at(label: &str, priority: Priority, timestamp: chrono::DateTime<Utc>) -> LogEntry {
    LogEntry::new(label.to_string(), "/var/log/a.log".into(), "s1".into(), timestamp, priority, 0)
}

#[tokio::test]
async fn priority_preemption_orders_batches() {
    let queue = IngestionQueue::new(queue_config(2, 10));

    let batches: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let batches_for_processor = batches.clone();
    queue
        .set_batch_processor(Arc::new(move |batch: Vec<LogEntry>| {
            let batches = batches_for_processor.clone();
            Box::pin(async move {
                batches.lock().await.push(batch.iter().map(|e| e.content.clone()).collect());
                Ok(())
            })
        }))
        .await;

    let t0 = Utc::now();
    let t1 = t0 + chrono::Duration::milliseconds(1);
    let t2 = t0 + chrono::Duration::milliseconds(2);

    queue.enqueue(entry_at("LOW@t0", Priority::Low, t0)).await;
    queue.enqueue(entry_at("LOW@t1", Priority::Low, t1)).await;
    queue.enqueue(entry_at("HIGH@t2", Priority::High, t2)).await;

    tokio::spawn(queue.clone().run());

    timeout(Duration::from_secs(2), async {
        loop {
            if batches.lock().await.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("batches did not form in time");

    let observed = batches.lock().await.clone();
    assert!(observed.contains(&vec!["HIGH@t2".to_string(), "LOW@t0".to_string()]));
    assert!(observed.contains(&vec!["LOW@t1".to_string()]));

    queue.shutdown().await;
}

#[tokio::test]
async fn retry_then_success_reaches_completed() {
    let queue = IngestionQueue::new(queue_config(1, 10));

    let call_count = Arc::new(AtomicUsize::new(0));
    let snapshots: Arc<Mutex<Vec<(u32, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let call_count_for_processor = call_count.clone();
    let snapshots_for_processor = snapshots.clone();
    queue
        .set_batch_processor(Arc::new(move |batch: Vec<LogEntry>| {
            let call_count = call_count_for_processor.clone();
            let snapshots = snapshots_for_processor.clone();
            Box::pin(async move {
                let attempt = call_count.fetch_add(1, Ordering::SeqCst);
                let entry = &batch[0];
                snapshots.lock().await.push((entry.retry_count, entry.error_count));
                if attempt < 2 {
                    Err("transient failure".to_string())
                } else {
                    Ok(())
                }
            })
        }))
        .await;

    queue.enqueue(entry_at("flaky", Priority::Medium, Utc::now())).await;

    tokio::spawn(queue.clone().run());
    tokio::spawn(queue.clone().run_stats_sampler());

    timeout(Duration::from_secs(2), async {
        loop {
            if call_count.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry did not complete in time");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = queue.stats().await;
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.retry_count, 2);

    let final_snapshot = *snapshots.lock().await.last().unwrap();
    assert_eq!(final_snapshot, (2, 2));

    queue.shutdown().await;
}
