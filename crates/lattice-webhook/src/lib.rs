//! Webhook channel support for the Lattice agent runtime
//!
//! This crate provides the bidirectional webhook channel:
//! - Outbound delivery with bounded exponential backoff and retry policy
//! - Inbound receiving with multi-format HMAC signature verification
//! - Per-channel token-bucket rate limiting
//! - Bounded in-memory delivery history and composite health checks
//!
//! # Architecture
//!
//! A [`WebhookChannel`] composes a [`Receiver`] (inbound path), a [`Sender`]
//! (outbound path), a [`LogStore`] (delivery history) and a bus handle.
//! The [`ChannelManager`] owns the set of channels and wires them to the
//! [`ConfigManager`] (JSON config file) and the runtime event bus.
//! [`webhook_routes`] exposes the HTTP surface; the host runtime mounts it
//! on its router and terminates TLS.
//!
//! Delivery history is best-effort and in-memory only. The design is
//! at-most-`max_retries + 1` attempts per send, with no cross-process
//! coordination and no receiver-side deduplication.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_webhook::{ChannelManager, ConfigManager, WebhookConfig, RetryConfig};
//!
//! let manager = ChannelManager::new(ConfigManager::new(config_path), Some(bus));
//! manager.load_channels().await?;
//!
//! let channel = manager
//!     .create_channel(WebhookConfig::new("ci-notify", "https://ci.example.com/hook"))
//!     .await?;
//! channel.connect().await?;
//! ```

pub mod bus;
pub mod channel;
pub mod config;
pub mod health;
pub mod limiter;
pub mod logs;
pub mod manager;
pub mod receiver;
pub mod routes;
pub mod sender;
pub mod signature;
pub mod types;

pub use bus::{BusEvent, EventBus};
pub use channel::{Channel, WebhookChannel};
pub use config::{ConfigManager, RateLimitConfig, RetryConfig, WebhookConfig};
pub use health::{HealthChecker, HealthResult, HealthStatus};
pub use limiter::RateLimiter;
pub use logs::LogStore;
pub use manager::ChannelManager;
pub use receiver::Receiver;
pub use routes::{webhook_routes, WebhookRouteState};
pub use sender::{DeliveryFailure, Sender};
pub use signature::WebhookSigner;
pub use types::{
    ChannelMessage, ChannelStatus, DeliveryLog, DeliveryStatus, IncomingWebhook,
};

use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid webhook config: {0}")]
    Config(String),

    #[error("signature verification failed: {0}")]
    Auth(String),

    #[error("rate limit exceeded for channel {0}")]
    RateLimited(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {0}")]
    Protocol(u16),

    #[error("webhook channel not found: {0}")]
    NotFound(String),

    #[error("invalid channel state: {0}")]
    State(String),

    #[error("delivery cancelled during retry")]
    Cancelled,

    #[error("delivery failed after {attempts} attempts: {source}")]
    DeliveryFailed {
        attempts: u32,
        #[source]
        source: Box<WebhookError>,
    },

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
