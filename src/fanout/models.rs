use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::EventUpdate;

/// Per-subscriber filter (spec §4.3). Subscribers with no entries in
/// `subscribed_types` receive every event type. Filters are pure functions
/// of `(filter, event)`; they never mutate shared state.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub subscribed_types: HashSet<String>,
    pub min_priority: u8,
    pub max_priority: u8,
    pub source_allow_list: Option<HashSet<String>>,
}

impl Filter {
    pub fn all() -> Self {
        Self {
            subscribed_types: HashSet::new(),
            min_priority: 0,
            max_priority: 10,
            source_allow_list: None,
        }
    }

    /// `source` is an optional hint taken from `event.payload.source`, since
    /// `EventUpdate` carries no dedicated source field of its own.
    pub fn matches(&self, event: &EventUpdate, source: Option<&str>) -> bool {
        if !self.subscribed_types.is_empty() && !self.subscribed_types.contains(&event.event_type) {
            return false;
        }
        if event.priority < self.min_priority || event.priority > self.max_priority {
            return false;
        }
        if let Some(allow) = &self.source_allow_list {
            let Some(source) = source else { return false };
            if !allow.contains(source) {
                return false;
            }
        }
        true
    }
}

/// The JSON envelope described in spec §6:
/// `{ "type", "timestamp", "payload", "client_id"? }`. `priority` and
/// `target_subscriber_id` ride along out-of-band of that envelope shape so
/// the gRPC transport (§10.7) can reconstruct the full `EventMessage` wire
/// type without the bus needing to know about protobuf at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_subscriber_id: Option<String>,
}

impl WireMessage {
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            timestamp: Utc::now(),
            payload,
            client_id: None,
            priority: 0,
            target_subscriber_id: None,
        }
    }

    pub fn from_event(event: &EventUpdate) -> Self {
        Self {
            priority: event.priority,
            target_subscriber_id: event.target_subscriber_id.clone(),
            ..Self::new(event.event_type.clone(), event.payload.clone())
        }
    }

    pub fn connection_established(client_id: &str) -> Self {
        Self {
            message_type: "connection_established".to_string(),
            timestamp: Utc::now(),
            payload: serde_json::json!({ "client_id": client_id, "server_time": Utc::now() }),
            client_id: Some(client_id.to_string()),
            priority: 0,
            target_subscriber_id: None,
        }
    }

    pub fn ping() -> Self {
        Self::new("ping", Value::Object(Default::default()))
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self::new("error", serde_json::json!({ "code": code, "message": message }))
    }
}
