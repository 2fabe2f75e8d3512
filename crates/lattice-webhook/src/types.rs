//! Core data types for the webhook channel.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection status of a channel instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Disconnected,
    Connected,
    Error,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

/// Delivery lifecycle status for one outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created, no attempt made yet
    Pending,
    /// An attempt is in flight or scheduled
    Retrying,
    /// Delivered successfully (terminal)
    Delivered,
    /// Exhausted retries or hit a non-retryable response (terminal)
    Failed,
}

/// Record of one outbound delivery attempt sequence.
///
/// Created at the start of a send, mutated in place across attempts, and
/// immutable once appended to the [`crate::LogStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    /// Delivery ID
    pub id: String,
    /// Channel that performed the delivery
    pub channel_id: String,
    /// Message that triggered the delivery
    pub message_id: String,
    /// Current status
    pub status: DeliveryStatus,
    /// Last attempt number reached (1-based)
    pub attempt: u32,
    /// Last error message, if any
    pub error: Option<String>,
    /// HTTP status of the last attempt that got a response
    pub response_code: Option<u16>,
    /// When the delivery was started
    pub created_at: DateTime<Utc>,
}

impl DeliveryLog {
    pub fn new(channel_id: &str, message_id: &str) -> Self {
        Self {
            id: generate_id("dlv"),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            status: DeliveryStatus::Pending,
            attempt: 0,
            error: None,
            response_code: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

/// One authenticated inbound webhook call.
///
/// Built by the [`crate::Receiver`], consumed once by
/// [`crate::WebhookChannel::receive`] and handed to the bus; the subsystem
/// keeps no copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingWebhook {
    pub id: String,
    pub channel_id: String,
    /// Raw request body
    pub payload: Vec<u8>,
    /// Flattened headers, first value per name
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// The runtime's normalized message shape.
///
/// Inbound webhooks are normalized into this before being published on the
/// bus; outbound sends take the `content` as the delivery payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub content: String,
    pub source: String,
    pub channel_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Generate a prefixed unique identifier, e.g. `wh_3f2a...`.
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
