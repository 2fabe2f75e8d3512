//! HTTP surface for the webhook subsystem.
//!
//! The host runtime mounts [`webhook_routes`] on its router; nothing here
//! binds a listener or terminates TLS.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::channel::Channel;
use crate::config::{RetryConfig, WebhookConfig};
use crate::health::HealthChecker;
use crate::manager::ChannelManager;
use crate::{Result, WebhookError};

const DEFAULT_LOG_LIMIT: usize = 100;

/// Shared state behind every webhook route.
#[derive(Clone)]
pub struct WebhookRouteState {
    pub manager: Arc<ChannelManager>,
    pub health: Arc<HealthChecker>,
}

impl WebhookRouteState {
    pub fn new(manager: Arc<ChannelManager>) -> Self {
        Self {
            manager,
            health: Arc::new(HealthChecker::new()),
        }
    }
}

/// Build the webhook router. Mount under the host's API prefix.
pub fn webhook_routes(state: WebhookRouteState) -> Router {
    Router::new()
        .route("/webhooks", get(list_channels).post(create_channel))
        .route("/webhooks/:channel_id", post(receive_webhook))
        .route("/webhooks/:channel_id/logs", get(channel_logs))
        .route("/webhooks/:channel_id/health", get(channel_health))
        .with_state(state)
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::Config(_) => StatusCode::BAD_REQUEST,
            WebhookError::Auth(_) => StatusCode::UNAUTHORIZED,
            WebhookError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            WebhookError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            WebhookError::NotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::State(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body for `POST /webhooks`.
#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

async fn receive_webhook(
    State(state): State<WebhookRouteState>,
    Path(channel_id): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let channel = state.manager.get_channel(&channel_id).await?;
    let message = channel.receive(&method, &headers, &body).await?;

    debug!(channel_id = %channel_id, message_id = %message.id, "Inbound webhook accepted");
    Ok((
        StatusCode::OK,
        Json(json!({ "status": "accepted", "message_id": message.id })),
    )
        .into_response())
}

async fn list_channels(State(state): State<WebhookRouteState>) -> Response {
    let channels = state.manager.list_channels().await;
    let summaries: Vec<_> = channels
        .iter()
        .map(|channel| {
            let config = channel.config();
            json!({
                "id": config.id,
                "name": config.name,
                "status": channel.status(),
                "enabled": config.enabled,
                "target_url": config.target_url,
                "port": config.port,
            })
        })
        .collect();
    Json(json!({ "channels": summaries })).into_response()
}

async fn create_channel(
    State(state): State<WebhookRouteState>,
    Json(request): Json<CreateChannelRequest>,
) -> Result<Response> {
    // The persistence layer assigns the ID and fills retry defaults.
    let config = WebhookConfig {
        id: String::new(),
        name: request.name,
        target_url: request.target_url,
        port: request.port,
        secret: request.secret,
        headers: request.headers,
        retry: request.retry,
        enabled: request.enabled,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    let channel = state.manager.create_channel(config).await?;
    Ok((StatusCode::CREATED, Json(channel.config().clone())).into_response())
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn channel_logs(
    State(state): State<WebhookRouteState>,
    Path(channel_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response> {
    let channel = state.manager.get_channel(&channel_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    let logs = channel.recent_logs(limit);
    Ok(Json(json!({ "logs": logs })).into_response())
}

async fn channel_health(
    State(state): State<WebhookRouteState>,
    Path(channel_id): Path<String>,
) -> Result<Response> {
    let channel = state.manager.get_channel(&channel_id).await?;
    let result = state.health.check(&channel).await;
    Ok(Json(result).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                WebhookError::Config("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                WebhookError::Auth("bad".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                WebhookError::RateLimited("ch".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                WebhookError::MethodNotAllowed("GET".into()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                WebhookError::NotFound("ch".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                WebhookError::State("disconnected".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (WebhookError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
            (
                WebhookError::Protocol(502),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
