use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::instrument;

use super::bus::FanoutBus;
use super::models::WireMessage;

/// One writer task per subscriber (spec §4.3: "A separate writer task per
/// subscriber drains its queue and writes to the underlying transport. If
/// a write fails, the subscriber is disconnected."). `rx` is the bus-owned
/// per-subscriber queue (`PerSubscriberQueue`); `transport_tx` is whatever
/// channel the transport adapter (`fanout::grpc`) is consuming from — here
/// it feeds a `tonic::Response<ReceiverStream<_>>`.
#[instrument(name = "threatlens_fanout_writer", target = "fanout::writer", skip_all)]
pub async fn run(
    bus: Arc<FanoutBus>,
    subscriber_id: String,
    mut rx: mpsc::Receiver<WireMessage>,
    transport_tx: mpsc::Sender<WireMessage>,
) {
    while let Some(message) = rx.recv().await {
        if transport_tx.send(message).await.is_err() {
            tracing::debug!(subscriber = %subscriber_id, "transport closed, disconnecting subscriber");
            break;
        }
    }
    bus.unregister(&subscriber_id).await;
}
