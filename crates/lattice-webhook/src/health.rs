//! Composite health checks for webhook channels.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{Channel, WebhookChannel};
use crate::types::ChannelStatus;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How many recent deliveries feed the success-rate check.
const RECENT_WINDOW: usize = 10;

/// Health verdict for one channel, worst condition wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Reachable, but fewer than half of recent deliveries succeeded
    Degraded,
    /// Target endpoint unreachable
    Unhealthy,
    Disconnected,
    Disabled,
}

/// Outcome of one health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub channel_id: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthResult {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Probes channels for liveness and recent delivery quality.
///
/// Uses its own short-timeout HTTP client so a slow endpoint cannot hold a
/// health check for the full delivery timeout.
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PROBE_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Check one channel: configuration, connection state, endpoint
    /// reachability, then recent delivery success rate.
    pub async fn check(&self, channel: &WebhookChannel) -> HealthResult {
        let config = channel.config();
        let mut result = HealthResult {
            channel_id: config.id.clone(),
            status: HealthStatus::Healthy,
            message: None,
            checked_at: Utc::now(),
        };

        if !config.enabled {
            result.status = HealthStatus::Disabled;
            result.message = Some("channel is disabled".to_string());
            return result;
        }

        if channel.status() != ChannelStatus::Connected {
            result.status = HealthStatus::Disconnected;
            result.message = Some("channel is not connected".to_string());
            return result;
        }

        if let Some(target_url) = config.target_url.as_deref() {
            // Any response means the endpoint is reachable; only a
            // transport-level failure marks it unhealthy.
            if let Err(err) = self.client.head(target_url).send().await {
                debug!(channel_id = %config.id, error = %err, "Health probe failed");
                result.status = HealthStatus::Unhealthy;
                result.message = Some(format!("target unreachable: {err}"));
                return result;
            }
        }

        let recent = channel.recent_logs(RECENT_WINDOW);
        if !recent.is_empty() {
            let delivered = recent.iter().filter(|log| log.is_delivered()).count();
            if delivered * 2 < recent.len() {
                result.status = HealthStatus::Degraded;
                result.message = Some(format!(
                    "{delivered}/{} recent deliveries succeeded",
                    recent.len()
                ));
            }
        }

        result
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
