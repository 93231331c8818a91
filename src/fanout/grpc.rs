//! Thin tonic adapter over the transport-agnostic `FanoutBus` (spec §10.7),
//! grounded on the teacher's `Shipper` turning an internal `mpsc` into a
//! `ReceiverStream` request stream (`services/log-collector/src/shipper/shipper.rs`).

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::instrument;

use super::bus::FanoutBus;
use super::models::{Filter, WireMessage};
use super::writer;
use crate::proto::fanout::fanout_server::Fanout;
use crate::proto::fanout::{EventMessage, PongRequest, PongResponse, SubscribeRequest};

const TRANSPORT_CHANNEL_CAPACITY: usize = 32;

pub struct FanoutGrpcService {
    bus: Arc<FanoutBus>,
}

impl FanoutGrpcService {
    pub fn new(bus: Arc<FanoutBus>) -> Self {
        Self { bus }
    }
}

fn to_event_message(message: WireMessage) -> EventMessage {
    EventMessage {
        event_type: message.message_type,
        priority: message.priority as u32,
        timestamp: message.timestamp.to_rfc3339(),
        payload_json: message.payload.to_string(),
        target_subscriber_id: message.target_subscriber_id,
        client_id: message.client_id,
    }
}

#[tonic::async_trait]
impl Fanout for FanoutGrpcService {
    type SubscribeStream = ReceiverStream<Result<EventMessage, Status>>;

    #[instrument(name = "threatlens_fanout_grpc_subscribe", target = "fanout::grpc", skip_all)]
    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();
        if req.identity_token.is_empty() {
            return Err(Status::unauthenticated("identity_token is required"));
        }

        let filter = Filter {
            subscribed_types: req.subscribed_types.into_iter().collect::<HashSet<_>>(),
            min_priority: req.min_priority.min(10) as u8,
            max_priority: req.max_priority.min(10) as u8,
            source_allow_list: if req.source_allow_list.is_empty() {
                None
            } else {
                Some(req.source_allow_list.into_iter().collect())
            },
        };

        let (id, bus_rx) = self
            .bus
            .register(req.identity_token, filter)
            .await
            .map_err(|err| Status::resource_exhausted(err.to_string()))?;

        let (transport_tx, transport_rx) = mpsc::channel::<WireMessage>(TRANSPORT_CHANNEL_CAPACITY);
        let _ = transport_tx.send(WireMessage::connection_established(&id)).await;

        tokio::spawn(writer::run(self.bus.clone(), id, bus_rx, transport_tx));

        let (out_tx, out_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut transport_rx = transport_rx;
            while let Some(message) = transport_rx.recv().await {
                if out_tx.send(Ok(to_event_message(message))).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(out_rx)))
    }

    #[instrument(name = "threatlens_fanout_grpc_pong", target = "fanout::grpc", skip_all)]
    async fn pong(&self, request: Request<PongRequest>) -> Result<Response<PongResponse>, Status> {
        let req = request.into_inner();
        self.bus.record_pong(&req.subscriber_id).await;
        Ok(Response::new(PongResponse {}))
    }
}
