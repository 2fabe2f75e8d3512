//! Channel configuration and the JSON config store.
//!
//! Channel configs live in a single JSON document (an array of
//! [`WebhookConfig`]) at a well-known path. Writes always rewrite the full
//! document: the list is serialized first, then written, so no partial
//! state is ever observable. Read-modify-write cycles are serialized by the
//! [`crate::ChannelManager`]'s lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::generate_id;
use crate::{Result, WebhookError};

/// Retry behavior for outbound deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each retry
    pub base_delay: Duration,
    /// Cap on the backoff delay
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Sensible defaults: 3 retries, 1 s base, 60 s cap.
    pub fn default_retry() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    /// True if the config was never populated.
    pub fn is_zero(&self) -> bool {
        self.max_retries == 0 && self.base_delay.is_zero() && self.max_delay.is_zero()
    }
}

/// Rate limiting for inbound webhook calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 10,
        }
    }
}

/// Identity and behavior of one webhook channel.
///
/// At least one of `target_url` (outbound destination) or `port` (inbound
/// listen hint; binding is the host router's job) must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Stable unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Outbound destination URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    /// Inbound listen hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Shared HMAC secret for signing and verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Static headers added to every outbound request
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Outbound retry behavior
    #[serde(default)]
    pub retry: RetryConfig,
    /// Whether the channel may connect
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookConfig {
    /// Create an enabled outbound config with default retry behavior.
    pub fn new(name: &str, target_url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id("wh"),
            name: name.to_string(),
            target_url: Some(target_url.to_string()),
            port: None,
            secret: None,
            headers: HashMap::new(),
            retry: RetryConfig::default_retry(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Loads, validates and persists channel configs as one JSON document.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Default location under the user's home directory.
    pub fn default_path() -> PathBuf {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".lattice").join("config").join("webhooks.json")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load every config. A missing file is an empty list, not an error.
    pub async fn load_all(&self) -> Result<Vec<WebhookConfig>> {
        let data = match tokio::fs::read(&self.config_path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let configs: Vec<WebhookConfig> = serde_json::from_slice(&data)?;
        Ok(configs)
    }

    /// Rewrite the full document. Serializes the entire list before
    /// touching the file, so a serialization failure leaves it intact.
    pub async fn save_all(&self, configs: &[WebhookConfig]) -> Result<()> {
        let data = serde_json::to_vec_pretty(configs)?;

        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.config_path, data).await?;

        debug!(count = configs.len(), path = %self.config_path.display(), "Persisted webhook configs");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<WebhookConfig> {
        let configs = self.load_all().await?;
        configs
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))
    }

    /// Upsert by ID. `updated_at` is always refreshed; `created_at` is
    /// stamped only on first insert.
    pub async fn save(&self, mut config: WebhookConfig) -> Result<()> {
        let mut configs = self.load_all().await?;

        // A zero-value retry config (e.g. an absent JSON field) means
        // "use the defaults", never "no retries".
        if config.retry.is_zero() {
            config.retry = RetryConfig::default_retry();
        }

        config.updated_at = Utc::now();

        match configs.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => {
                config.created_at = existing.created_at;
                *existing = config;
            }
            None => {
                config.created_at = config.updated_at;
                configs.push(config);
            }
        }

        self.save_all(&configs).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut configs = self.load_all().await?;
        let before = configs.len();
        configs.retain(|c| c.id != id);

        if configs.len() == before {
            return Err(WebhookError::NotFound(id.to_string()));
        }

        self.save_all(&configs).await
    }

    pub fn validate(&self, config: &WebhookConfig) -> Result<()> {
        if config.id.is_empty() {
            return Err(WebhookError::Config("id is required".to_string()));
        }
        if config.name.is_empty() {
            return Err(WebhookError::Config("name is required".to_string()));
        }
        if config.target_url.as_deref().unwrap_or("").is_empty() && config.port.is_none() {
            return Err(WebhookError::Config(
                "either target_url or port must be specified".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an ID if absent, validate, apply default retry behavior to a
    /// zero-value retry config, then save.
    pub async fn create(&self, mut config: WebhookConfig) -> Result<WebhookConfig> {
        if config.id.is_empty() {
            config.id = generate_id("wh");
        }

        self.validate(&config)?;

        if config.retry.is_zero() {
            config.retry = RetryConfig::default_retry();
        }

        let now = Utc::now();
        config.created_at = now;
        config.updated_at = now;

        self.save(config.clone()).await?;
        Ok(config)
    }
}
