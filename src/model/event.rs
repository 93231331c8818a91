use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fan-out payload (spec §3). `priority` here is an independent 0-10 scale,
/// unrelated to `model::Priority` used by the ingestion queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventUpdate {
    pub event_type: String,
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_subscriber_id: Option<String>,
}

impl EventUpdate {
    pub fn new(event_type: impl Into<String>, priority: u8, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            priority: priority.min(10),
            timestamp: Utc::now(),
            payload,
            target_subscriber_id: None,
        }
    }

    pub fn targeted(mut self, subscriber_id: impl Into<String>) -> Self {
        self.target_subscriber_id = Some(subscriber_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_clamped_to_ten() {
        let e = EventUpdate::new("processing_update", 250, Value::Null);
        assert_eq!(e.priority, 10);
    }
}
