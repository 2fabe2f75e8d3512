//! The channel abstraction and its webhook implementation.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use parking_lot::RwLock;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::{BusEvent, EventBus, EVENT_CHANNEL_MESSAGE, EVENT_TRACE};
use crate::config::WebhookConfig;
use crate::logs::LogStore;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::types::{ChannelMessage, ChannelStatus, DeliveryLog};
use crate::{Result, WebhookError};

/// Capability set every runtime channel exposes.
///
/// `connect` and `disconnect` are logical state transitions; a webhook
/// channel holds no persistent socket, so "connected" means "ready to
/// accept and deliver".
#[async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> &str;
    fn channel_type(&self) -> &'static str;
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    /// Deliver a payload to the channel's target, blocking through retries.
    async fn send(&self, payload: &[u8], message_id: &str) -> Result<DeliveryLog>;
    /// Process one inbound call and publish the normalized message.
    async fn receive(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ChannelMessage>;
    fn status(&self) -> ChannelStatus;
    /// Quick liveness check: Ok only when enabled and connected.
    fn health(&self) -> Result<()>;
}

/// Bidirectional HTTP channel.
///
/// Composes a [`Receiver`] for the inbound path, a [`Sender`] for the
/// outbound path and a [`LogStore`] for delivery history. Mutable state is
/// limited to the status and the cancellation token, each under a plain
/// `RwLock`; nothing awaits while holding either.
pub struct WebhookChannel {
    config: WebhookConfig,
    receiver: Receiver,
    sender: Sender,
    logs: LogStore,
    status: RwLock<ChannelStatus>,
    bus: Option<Arc<dyn EventBus>>,
    // Replaced with a fresh token on every connect; a cancelled token
    // must not outlive the disconnect that triggered it.
    cancel: RwLock<CancellationToken>,
}

impl std::fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("config", &self.config)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig, bus: Option<Arc<dyn EventBus>>) -> Self {
        Self {
            receiver: Receiver::new(config.clone()),
            sender: Sender::new(config.clone()),
            logs: LogStore::new(),
            status: RwLock::new(ChannelStatus::Disconnected),
            bus,
            cancel: RwLock::new(CancellationToken::new()),
            config,
        }
    }

    /// Channel backed by an injected HTTP client.
    pub fn with_client(
        config: WebhookConfig,
        bus: Option<Arc<dyn EventBus>>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            receiver: Receiver::new(config.clone()),
            sender: Sender::with_client(config.clone(), client),
            logs: LogStore::new(),
            status: RwLock::new(ChannelStatus::Disconnected),
            bus,
            cancel: RwLock::new(CancellationToken::new()),
            config,
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Delivery history for this channel, newest first.
    pub fn recent_logs(&self, limit: usize) -> Vec<DeliveryLog> {
        self.logs.get_by_channel(&self.config.id, limit)
    }

    fn set_status(&self, status: ChannelStatus) {
        *self.status.write() = status;
    }

    fn publish(&self, event: BusEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    fn publish_delivery_trace(&self, message_id: &str, log: &DeliveryLog) {
        self.publish(BusEvent::new(
            EVENT_TRACE,
            json!({
                "kind": "webhook.sent",
                "channel_id": self.config.id,
                "message_id": message_id,
                "delivery_id": log.id,
                "status": log.status,
            }),
        ));
    }

    fn require_connected(&self) -> Result<()> {
        let status = *self.status.read();
        if status != ChannelStatus::Connected {
            return Err(WebhookError::State(format!(
                "channel {} is {}",
                self.config.id,
                status.as_str()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    async fn connect(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(WebhookError::State(format!(
                "channel {} is disabled",
                self.config.id
            )));
        }
        *self.cancel.write() = CancellationToken::new();
        self.set_status(ChannelStatus::Connected);
        info!(channel_id = %self.config.id, name = %self.config.name, "Webhook channel connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.cancel.read().cancel();
        self.set_status(ChannelStatus::Disconnected);
        info!(channel_id = %self.config.id, "Webhook channel disconnected");
        Ok(())
    }

    async fn send(&self, payload: &[u8], message_id: &str) -> Result<DeliveryLog> {
        self.require_connected()?;

        let cancel = self.cancel.read().clone();
        match self.sender.send(payload, message_id, &cancel).await {
            Ok(log) => {
                self.logs.add(log.clone());
                self.publish_delivery_trace(message_id, &log);
                Ok(log)
            }
            Err(failure) => {
                error!(
                    channel_id = %self.config.id,
                    message_id,
                    error = %failure.error,
                    "Webhook delivery failed"
                );
                self.publish_delivery_trace(message_id, &failure.log);
                self.logs.add(failure.log);
                self.set_status(ChannelStatus::Error);
                Err(failure.error)
            }
        }
    }

    async fn receive(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ChannelMessage> {
        self.require_connected()?;

        let incoming = self.receiver.handle(method, headers, body)?;

        let message = ChannelMessage {
            id: incoming.id,
            content: String::from_utf8_lossy(&incoming.payload).into_owned(),
            source: self.config.id.clone(),
            channel_id: incoming.channel_id,
            sender_id: "webhook".to_string(),
            metadata: incoming.headers,
            created_at: incoming.timestamp,
        };

        self.publish(BusEvent::new(EVENT_CHANNEL_MESSAGE, &message));
        Ok(message)
    }

    fn status(&self) -> ChannelStatus {
        *self.status.read()
    }

    fn health(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(WebhookError::State(format!(
                "channel {} is disabled",
                self.config.id
            )));
        }
        self.require_connected()
    }
}
