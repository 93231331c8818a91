use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::instrument;

use super::errors::FanoutError;
use super::models::{Filter, WireMessage};
use crate::metrics::metrics::{
    FANOUT_DELIVERED_TOTAL, FANOUT_DISCONNECTED_SLOW_TOTAL, FANOUT_DROPPED_TOTAL, FANOUT_SUBSCRIBERS,
};
use crate::model::EventUpdate;

/// A live fan-out destination (spec §3 `Subscriber`). The bus core never
/// touches a transport directly: `outbound` is a plain bounded channel a
/// writer task (see `fanout::writer`) drains into whatever transport the
/// caller wired up (see `fanout::grpc`).
pub struct Subscriber {
    pub id: String,
    pub principal_id: String,
    pub filter: RwLock<Filter>,
    pub outbound: mpsc::Sender<WireMessage>,
    pub connected_at: DateTime<Utc>,
    pub last_ping_at: Mutex<Option<DateTime<Utc>>>,
    pub last_pong_at: Mutex<Option<DateTime<Utc>>>,
    pub consecutive_drops: AtomicU32,
    pub dropped_count: AtomicU64,
    pub delivered_count: AtomicU64,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("principal_id", &self.principal_id)
            .finish_non_exhaustive()
    }
}

/// Transport-agnostic core of the Event Fan-out Bus (spec §4.3). Owns the
/// subscriber registry; delivery discipline (non-blocking enqueue, per-
/// subscriber drop counting, slow-consumer disconnect) lives here so it is
/// identical regardless of which transport (gRPC, in this spec) fans the
/// queue out to the wire.
pub struct FanoutBus {
    max_subscribers: usize,
    per_subscriber_queue: usize,
    slow_subscriber_threshold: u32,
    ping_interval: Duration,
    pong_timeout: Duration,
    /// Effective per-subscriber ceiling, normally `per_subscriber_queue`.
    /// Lowered by the Controller under memory pressure (spec §4.4: "cap
    /// subscriber queues") and restored once pressure subsides.
    soft_cap: AtomicU64,
    subscribers: Mutex<HashMap<String, Arc<Subscriber>>>,
}

impl std::fmt::Debug for FanoutBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutBus")
            .field("max_subscribers", &self.max_subscribers)
            .field("per_subscriber_queue", &self.per_subscriber_queue)
            .finish_non_exhaustive()
    }
}

impl FanoutBus {
    pub fn new(
        max_subscribers: usize,
        per_subscriber_queue: usize,
        slow_subscriber_threshold: u32,
        ping_interval: Duration,
        pong_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            max_subscribers,
            per_subscriber_queue,
            slow_subscriber_threshold,
            ping_interval,
            pong_timeout,
            soft_cap: AtomicU64::new(per_subscriber_queue as u64),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    /// Lowers (or restores) the effective per-subscriber queue ceiling.
    /// Clamped to `[1, per_subscriber_queue]`.
    pub fn cap_subscriber_queues(&self, cap: usize) {
        let clamped = cap.clamp(1, self.per_subscriber_queue);
        self.soft_cap.store(clamped as u64, Ordering::Relaxed);
    }

    pub fn restore_subscriber_queue_cap(&self) {
        self.soft_cap.store(self.per_subscriber_queue as u64, Ordering::Relaxed);
    }

    #[instrument(name = "threatlens_fanout_register", target = "fanout::bus", skip(self, filter))]
    pub async fn register(
        &self,
        principal_id: String,
        filter: Filter,
    ) -> Result<(String, mpsc::Receiver<WireMessage>), FanoutError> {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.len() >= self.max_subscribers {
            return Err(FanoutError::SubscriberLimitReached(self.max_subscribers));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.per_subscriber_queue);
        let subscriber = Arc::new(Subscriber {
            id: id.clone(),
            principal_id,
            filter: RwLock::new(filter),
            outbound: tx,
            connected_at: Utc::now(),
            last_ping_at: Mutex::new(None),
            last_pong_at: Mutex::new(None),
            consecutive_drops: AtomicU32::new(0),
            dropped_count: AtomicU64::new(0),
            delivered_count: AtomicU64::new(0),
        });
        subscribers.insert(id.clone(), subscriber);
        FANOUT_SUBSCRIBERS.set(subscribers.len() as i64);
        Ok((id, rx))
    }

    #[instrument(name = "threatlens_fanout_unregister", target = "fanout::bus", skip(self))]
    pub async fn unregister(&self, id: &str) {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.remove(id).is_some() {
            FANOUT_SUBSCRIBERS.set(subscribers.len() as i64);
        }
    }

    pub async fn update_filter(&self, id: &str, filter: Filter) -> Result<(), FanoutError> {
        let subscribers = self.subscribers.lock().await;
        let subscriber = subscribers.get(id).ok_or_else(|| FanoutError::Disconnected(id.to_string()))?;
        *subscriber.filter.write().await = filter;
        Ok(())
    }

    pub async fn record_pong(&self, id: &str) {
        let subscribers = self.subscribers.lock().await;
        if let Some(subscriber) = subscribers.get(id) {
            *subscriber.last_pong_at.lock().await = Some(Utc::now());
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Non-blocking fan-out to every matching subscriber (spec §4.3:
    /// "`Broadcast` itself never blocks"). Returns the number of
    /// subscribers the message was successfully enqueued for.
    #[instrument(name = "threatlens_fanout_broadcast", target = "fanout::bus", skip(self, event))]
    pub async fn broadcast(&self, event: EventUpdate, source: Option<&str>) -> usize {
        let message = WireMessage::from_event(&event);
        let targets: Vec<Arc<Subscriber>> = {
            let mut matching = Vec::new();
            for subscriber in self.subscribers.lock().await.values() {
                if subscriber.filter.read().await.matches(&event, source) {
                    matching.push(subscriber.clone());
                }
            }
            matching
        };

        let mut delivered = 0;
        let mut to_disconnect = Vec::new();
        for subscriber in &targets {
            if self.try_deliver(subscriber, message.clone()) {
                delivered += 1;
            } else if subscriber.consecutive_drops.load(Ordering::Relaxed) >= self.slow_subscriber_threshold {
                to_disconnect.push(subscriber.id.clone());
            }
        }
        for id in to_disconnect {
            tracing::warn!(subscriber_id = %id, "disconnecting slow subscriber");
            FANOUT_DISCONNECTED_SLOW_TOTAL.inc();
            self.unregister(&id).await;
        }
        delivered
    }

    pub async fn send_to(&self, id: &str, event: EventUpdate) -> bool {
        let subscriber = match self.subscribers.lock().await.get(id).cloned() {
            Some(s) => s,
            None => return false,
        };
        let message = WireMessage::from_event(&event);
        self.try_deliver(&subscriber, message)
    }

    fn try_deliver(&self, subscriber: &Arc<Subscriber>, message: WireMessage) -> bool {
        let used = self.per_subscriber_queue.saturating_sub(subscriber.outbound.capacity());
        let soft_cap = self.soft_cap.load(Ordering::Relaxed) as usize;
        if used >= soft_cap {
            subscriber.consecutive_drops.fetch_add(1, Ordering::Relaxed);
            subscriber.dropped_count.fetch_add(1, Ordering::Relaxed);
            FANOUT_DROPPED_TOTAL.inc();
            return false;
        }
        match subscriber.outbound.try_send(message) {
            Ok(()) => {
                subscriber.consecutive_drops.store(0, Ordering::Relaxed);
                subscriber.delivered_count.fetch_add(1, Ordering::Relaxed);
                FANOUT_DELIVERED_TOTAL.inc();
                true
            }
            Err(_) => {
                subscriber.consecutive_drops.fetch_add(1, Ordering::Relaxed);
                subscriber.dropped_count.fetch_add(1, Ordering::Relaxed);
                FANOUT_DROPPED_TOTAL.inc();
                false
            }
        }
    }

    /// Periodic liveness sweep (spec §4.3): ping every subscriber on
    /// `PingInterval`; disconnect anyone who hasn't ponged within
    /// `PongTimeout`.
    pub async fn run_liveness(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(self.ping_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.liveness_sweep().await,
            }
        }
    }

    async fn liveness_sweep(&self) {
        let now = Utc::now();
        let subscribers: Vec<Arc<Subscriber>> = self.subscribers.lock().await.values().cloned().collect();
        let mut stale = Vec::new();
        for subscriber in subscribers {
            let last_pong = *subscriber.last_pong_at.lock().await;
            let overdue = match last_pong {
                Some(t) => now.signed_duration_since(t) > chrono::Duration::from_std(self.pong_timeout).unwrap_or_default(),
                None => now.signed_duration_since(subscriber.connected_at)
                    > chrono::Duration::from_std(self.pong_timeout).unwrap_or_default(),
            };
            if overdue {
                stale.push(subscriber.id.clone());
                continue;
            }
            *subscriber.last_ping_at.lock().await = Some(now);
            let _ = subscriber.outbound.try_send(WireMessage::ping());
        }
        for id in stale {
            tracing::warn!(subscriber_id = %id, "disconnecting unresponsive subscriber");
            self.unregister(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn test_bus(queue: usize, threshold: u32) -> Arc<FanoutBus> {
        FanoutBus::new(10, queue, threshold, Duration::from_secs(30), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn broadcast_respects_filter() {
        let bus = test_bus(8, 100);
        let (id, mut rx) = bus
            .register(
                "p1".into(),
                Filter {
                    subscribed_types: ["processing_update".to_string()].into_iter().collect(),
                    min_priority: 0,
                    max_priority: 10,
                    source_allow_list: None,
                },
            )
            .await
            .unwrap();

        let delivered = bus
            .broadcast(EventUpdate::new("security_event", 5, Value::Null), None)
            .await;
        assert_eq!(delivered, 0);

        let delivered = bus
            .broadcast(EventUpdate::new("processing_update", 5, Value::Null), None)
            .await;
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(bus.subscriber_count().await == 1 && !id.is_empty());
    }

    #[tokio::test]
    async fn slow_subscriber_disconnects_after_threshold() {
        let bus = test_bus(1, 2);
        let (_id, _rx) = bus.register("p1".into(), Filter::all()).await.unwrap();

        for _ in 0..5 {
            bus.broadcast(EventUpdate::new("processing_update", 1, Value::Null), None)
                .await;
        }
        assert_eq!(bus.subscriber_count().await, 0);
    }
}
