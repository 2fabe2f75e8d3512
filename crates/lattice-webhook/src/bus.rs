//! The event-bus capability used by channels.
//!
//! The subsystem never subscribes; it only publishes. The host runtime
//! injects its bus through the [`EventBus`] trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type for inbound messages normalized by a channel.
pub const EVENT_CHANNEL_MESSAGE: &str = "channel.message";
/// Event type for outbound delivery traces.
pub const EVENT_TRACE: &str = "trace.event";

/// One event published on the runtime bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new<T: Serialize>(event_type: impl Into<String>, payload: T) -> Self {
        Self {
            event_type: event_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
            timestamp: Utc::now(),
        }
    }
}

/// Publish capability of the runtime's event bus.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: BusEvent);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_serialization() {
        let event = BusEvent::new(EVENT_TRACE, serde_json::json!({"kind": "webhook.sent"}));
        assert_eq!(event.event_type, "trace.event");
        assert_eq!(event.payload["kind"], "webhook.sent");
    }
}
