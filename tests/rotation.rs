//! File-rotation handling (spec §6, §8 scenario 5): a truncated-then-refilled
//! file must not replay what came before the truncation.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::timeout;

use threatlens_core::model::{LogSource, LogSourceKind};
use threatlens_core::tailing::{ConsumerOutcome, TailingEngine};

#[tokio::test]
async fn truncated_file_is_not_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("rotating.log");
    tokio::fs::write(&file_path, b"X\n").await.unwrap();

    let tailing = TailingEngine::new(Duration::from_secs(5), 1_000);
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let received_for_consumer = received.clone();
    tailing
        .set_consumer(Arc::new(move |entry| {
            let received = received_for_consumer.clone();
            Box::pin(async move {
                received.lock().await.push(entry.content.clone());
                ConsumerOutcome::Accepted
            })
        }))
        .await;

    let mut source = LogSource::new("rotating", file_path.clone(), LogSourceKind::File);
    source.polling_interval_ms = Some(20);
    tailing.add_source(source).await.unwrap();

    // A freshly added source starts at EOF (spec §4.1): "X" must never surface.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(received.lock().await.is_empty());

    tokio::fs::write(&file_path, b"").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut file = tokio::fs::OpenOptions::new().append(true).open(&file_path).await.unwrap();
    file.write_all(b"Y\n").await.unwrap();
    file.flush().await.unwrap();

    timeout(Duration::from_secs(2), async {
        loop {
            if !received.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("rotation line was not emitted");

    let observed = received.lock().await.clone();
    assert_eq!(observed, vec!["Y".to_string()]);

    tailing.shutdown().await;
}
