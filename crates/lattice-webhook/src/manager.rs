//! Lifecycle management for the set of webhook channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::channel::{Channel, WebhookChannel};
use crate::config::{ConfigManager, WebhookConfig};
use crate::{Result, WebhookError};

/// Owns every live [`WebhookChannel`] and keeps the in-memory set in step
/// with the persisted configs.
///
/// The channel map lock is held across config persistence so concurrent
/// mutations of the same channel serialize into one read-modify-write
/// cycle. It is never held across delivery or probe I/O.
pub struct ChannelManager {
    config_manager: ConfigManager,
    channels: RwLock<HashMap<String, Arc<WebhookChannel>>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl ChannelManager {
    pub fn new(config_manager: ConfigManager, bus: Option<Arc<dyn EventBus>>) -> Self {
        Self {
            config_manager,
            channels: RwLock::new(HashMap::new()),
            bus,
        }
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// Instantiate every enabled persisted config. Inbound channels (those
    /// with a port) are connected in the background so startup never blocks
    /// on a single channel.
    pub async fn load_channels(&self) -> Result<()> {
        let configs = self.config_manager.load_all().await?;
        let mut channels = self.channels.write().await;

        let mut loaded = 0usize;
        for config in configs {
            if !config.enabled {
                continue;
            }

            let channel = Arc::new(WebhookChannel::new(config.clone(), self.bus.clone()));
            channels.insert(config.id.clone(), channel.clone());
            loaded += 1;

            if config.port.is_some() {
                let id = config.id.clone();
                tokio::spawn(async move {
                    if let Err(err) = channel.connect().await {
                        error!(channel_id = %id, error = %err, "Failed to connect webhook channel");
                    }
                });
            }
        }

        info!(count = loaded, "Loaded webhook channels");
        Ok(())
    }

    pub async fn get_channel(&self, id: &str) -> Result<Arc<WebhookChannel>> {
        self.channels
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))
    }

    pub async fn list_channels(&self) -> Vec<Arc<WebhookChannel>> {
        self.channels.read().await.values().cloned().collect()
    }

    /// Validate, persist and instantiate a new channel. The caller decides
    /// when to connect it.
    pub async fn create_channel(&self, config: WebhookConfig) -> Result<Arc<WebhookChannel>> {
        let mut channels = self.channels.write().await;

        let config = self.config_manager.create(config).await?;
        let channel = Arc::new(WebhookChannel::new(config.clone(), self.bus.clone()));
        channels.insert(config.id.clone(), channel.clone());

        info!(channel_id = %config.id, name = %config.name, "Created webhook channel");
        Ok(channel)
    }

    /// Replace a channel's config. The old instance is disconnected, the
    /// config persisted, and a fresh instance takes its place; if the new
    /// config is enabled it reconnects in the background.
    pub async fn update_channel(
        &self,
        id: &str,
        mut config: WebhookConfig,
    ) -> Result<Arc<WebhookChannel>> {
        let mut channels = self.channels.write().await;

        // Updates may only target known channels; the ID in the body is
        // ignored in favor of the path.
        let old = channels
            .get(id)
            .cloned()
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;
        config.id = id.to_string();
        self.config_manager.validate(&config)?;

        if let Err(err) = old.disconnect().await {
            warn!(channel_id = %id, error = %err, "Failed to disconnect channel during update");
        }

        self.config_manager.save(config.clone()).await?;

        let channel = Arc::new(WebhookChannel::new(config.clone(), self.bus.clone()));
        channels.insert(id.to_string(), channel.clone());

        if config.enabled {
            let reconnect = channel.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                if let Err(err) = reconnect.connect().await {
                    error!(channel_id = %id, error = %err, "Failed to reconnect webhook channel");
                }
            });
        }

        info!(channel_id = %id, "Updated webhook channel");
        Ok(channel)
    }

    /// Disconnect and remove a channel, then delete its persisted config.
    pub async fn delete_channel(&self, id: &str) -> Result<()> {
        let mut channels = self.channels.write().await;

        let channel = channels
            .remove(id)
            .ok_or_else(|| WebhookError::NotFound(id.to_string()))?;

        if let Err(err) = channel.disconnect().await {
            warn!(channel_id = %id, error = %err, "Failed to disconnect channel during delete");
        }

        self.config_manager.delete(id).await?;
        info!(channel_id = %id, "Deleted webhook channel");
        Ok(())
    }

    /// Disconnect everything. Persisted configs are untouched.
    pub async fn shutdown(&self) {
        let mut channels = self.channels.write().await;
        for (id, channel) in channels.drain() {
            if let Err(err) = channel.disconnect().await {
                warn!(channel_id = %id, error = %err, "Failed to disconnect channel during shutdown");
            }
        }
        info!("Webhook channel manager shut down");
    }
}
