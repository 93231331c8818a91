//! A slow subscriber must be isolated and disconnected without starving a
//! healthy one (spec §8 scenario 6).

use std::time::Duration;

use serde_json::Value;

use threatlens_core::fanout::{Filter, FanoutBus};
use threatlens_core::model::EventUpdate;

#[tokio::test]
async fn slow_subscriber_is_disconnected_without_affecting_healthy_one() {
    let bus = FanoutBus::new(10, 4, 3, Duration::from_secs(30), Duration::from_secs(60));

    let (_id_a, mut rx_a) = bus.register("fast".to_string(), Filter::all()).await.unwrap();
    let (id_b, rx_b) = bus.register("slow".to_string(), Filter::all()).await.unwrap();
    // `rx_b` is intentionally never drained.

    for i in 0..20u32 {
        bus.broadcast(EventUpdate::new("update", 5, Value::from(i)), None).await;
    }

    let mut received_a = 0;
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(200), rx_a.recv()).await {
        received_a += 1;
    }
    assert_eq!(received_a, 20, "a draining subscriber must receive every broadcast");

    assert_eq!(bus.subscriber_count().await, 1, "the slow subscriber must have been disconnected");

    let mut received_b = 0;
    let mut rx_b = rx_b;
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(50), rx_b.recv()).await {
        received_b += 1;
    }
    assert_eq!(received_b, 4, "the slow subscriber keeps only what fit in its queue before disconnect");

    assert!(!bus.send_to(&id_b, EventUpdate::new("update", 5, Value::Null)).await);
}
