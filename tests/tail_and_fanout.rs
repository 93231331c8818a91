//! End-to-end: tailing a growing file through the ingestion queue to a
//! fan-out subscriber (spec §8, scenario 1 "Tail and fan-out").

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use threatlens_core::fanout::{Filter, FanoutBus};
use threatlens_core::helpers::load_config::QueueConfig;
use threatlens_core::model::{EventUpdate, LogSource, LogSourceKind, Priority};
use threatlens_core::queue::IngestionQueue;
use threatlens_core::tailing::{ConsumerOutcome, TailingEngine};

fn queue_config() -> QueueConfig {
    QueueConfig {
        max_queue_size: 1_000,
        batch_size: 1,
        min_batch_size: 1,
        max_batch_size: 10,
        batch_timeout_ms: 50,
        max_concurrent_batches: 4,
        backpressure_threshold: 0.8,
        stats_interval_ms: 60_000,
    }
}

#[tokio::test]
async fn tail_produces_fanout_events_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("s1.log");
    tokio::fs::write(&file_path, b"").await.unwrap();

    let bus = FanoutBus::new(10, 32, 100, Duration::from_secs(30), Duration::from_secs(60));
    let queue = IngestionQueue::new(queue_config());

    let bus_for_processor = bus.clone();
    queue
        .set_batch_processor(Arc::new(move |batch| {
            let bus = bus_for_processor.clone();
            Box::pin(async move {
                for entry in &batch {
                    let event = EventUpdate::new(
                        "processing_update",
                        5,
                        Value::String(entry.content.clone()),
                    );
                    bus.broadcast(event, Some(&entry.source_name)).await;
                }
                Ok(())
            })
        }))
        .await;

    tokio::spawn(queue.clone().run());

    let tailing = TailingEngine::new(Duration::from_secs(5), 1_000);
    let queue_for_consumer = queue.clone();
    tailing
        .set_consumer(Arc::new(move |entry| {
            let queue = queue_for_consumer.clone();
            Box::pin(async move {
                queue.enqueue(entry).await;
                ConsumerOutcome::Accepted
            })
        }))
        .await;

    let mut source = LogSource::new("s1", file_path.clone(), LogSourceKind::File);
    source.priority = Priority::Medium;
    source.polling_interval_ms = Some(20);
    tailing.add_source(source).await.unwrap();

    let (_id, mut rx) = bus
        .register(
            "subscriber-1".to_string(),
            Filter {
                subscribed_types: ["processing_update".to_string()].into_iter().collect::<HashSet<_>>(),
                min_priority: 0,
                max_priority: 10,
                source_allow_list: None,
            },
        )
        .await
        .unwrap();

    let mut file = tokio::fs::OpenOptions::new().append(true).open(&file_path).await.unwrap();
    file.write_all(b"A\nB\nC\n").await.unwrap();
    file.flush().await.unwrap();

    let mut received = Vec::new();
    while received.len() < 3 {
        let message = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for fan-out message")
            .expect("bus subscriber channel closed");
        received.push(message.payload.as_str().unwrap().to_string());
    }

    assert_eq!(received, vec!["A", "B", "C"]);

    tailing.shutdown().await;
    queue.shutdown().await;
}
