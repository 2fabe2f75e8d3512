//! Inbound HTTP surface tests, driving the router directly.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use lattice_webhook::{
    webhook_routes, BusEvent, Channel, ChannelManager, ConfigManager, EventBus, WebhookConfig,
    WebhookRouteState, WebhookSigner,
};
use parking_lot::Mutex;
use tower::ServiceExt;

/// Records published events for assertions.
#[derive(Default)]
struct RecordingBus {
    events: Mutex<Vec<BusEvent>>,
}

impl RecordingBus {
    fn events(&self) -> Vec<BusEvent> {
        self.events.lock().clone()
    }
}

impl EventBus for RecordingBus {
    fn publish(&self, event: BusEvent) {
        self.events.lock().push(event);
    }
}

fn temp_config_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("lattice-inbound-{name}-{}", std::process::id()))
        .join("webhooks.json")
}

struct Harness {
    manager: Arc<ChannelManager>,
    bus: Arc<RecordingBus>,
    router: axum::Router,
}

fn harness(name: &str) -> Harness {
    let bus = Arc::new(RecordingBus::default());
    let manager = Arc::new(ChannelManager::new(
        ConfigManager::new(temp_config_path(name)),
        Some(bus.clone() as Arc<dyn EventBus>),
    ));
    let router = webhook_routes(WebhookRouteState::new(manager.clone()));
    Harness {
        manager,
        bus,
        router,
    }
}

async fn inbound_channel(harness: &Harness, config: WebhookConfig) -> String {
    let channel = harness.manager.create_channel(config).await.unwrap();
    channel.connect().await.unwrap();
    channel.id().to_string()
}

fn post_webhook(channel_id: &str, signature: Option<&str>, body: &[u8]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{channel_id}"))
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Webhook-Signature", signature);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn signed_inbound_webhook_is_accepted_and_published() {
    let harness = harness("signed");
    let config = WebhookConfig::new("inbound", "https://example.com/out")
        .with_port(9100)
        .with_secret("s3cret");
    let channel_id = inbound_channel(&harness, config).await;

    let payload = br#"{"text":"hello"}"#;
    let signature = WebhookSigner::new("s3cret").sign(payload);
    let response = harness
        .router
        .clone()
        .oneshot(post_webhook(&channel_id, Some(&signature), payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");

    let events = harness.bus.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "channel.message");
    assert_eq!(events[0].payload["channel_id"], channel_id);
    assert_eq!(events[0].payload["source"], channel_id);
    assert_eq!(events[0].payload["content"], r#"{"text":"hello"}"#);
    assert_eq!(events[0].payload["sender_id"], "webhook");
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let harness = harness("badsig");
    let config = WebhookConfig::new("inbound", "https://example.com/out")
        .with_port(9101)
        .with_secret("s3cret");
    let channel_id = inbound_channel(&harness, config).await;

    let signature = WebhookSigner::new("wrong-secret").sign(b"{}");
    let response = harness
        .router
        .clone()
        .oneshot(post_webhook(&channel_id, Some(&signature), b"{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.bus.events().is_empty());
}

#[tokio::test]
async fn unknown_channel_is_not_found() {
    let harness = harness("unknown");

    let response = harness
        .router
        .clone()
        .oneshot(post_webhook("wh_missing", None, b"{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disconnected_channel_is_unavailable() {
    let harness = harness("disconnected");
    let config = WebhookConfig::new("inbound", "https://example.com/out").with_port(9102);
    let channel = harness.manager.create_channel(config).await.unwrap();

    let response = harness
        .router
        .clone()
        .oneshot(post_webhook(channel.id(), None, b"{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn create_and_list_channels_over_http() {
    let harness = harness("create");

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("Content-Type", "application/json")
        .body(Body::from(
            r#"{"name":"ci-notify","target_url":"https://ci.example.com/hook"}"#,
        ))
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let created = body_json(response).await;
    assert_eq!(created["name"], "ci-notify");
    let id = created["id"].as_str().unwrap();
    assert!(id.starts_with("wh_"));

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/webhooks")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let listed = body_json(response).await;
    let channels = listed["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["id"], id);
    assert_eq!(channels[0]["status"], "disconnected");
}

#[tokio::test]
async fn create_without_target_or_port_is_rejected() {
    let harness = harness("invalid");

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"name":"broken"}"#))
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("target_url or port"));
}

#[tokio::test]
async fn health_endpoint_reports_disconnected() {
    let harness = harness("health");
    let config = WebhookConfig::new("inbound", "https://example.com/out").with_port(9103);
    let channel = harness.manager.create_channel(config).await.unwrap();

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/webhooks/{}/health", channel.id()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["channel_id"], channel.id());
}

#[tokio::test]
async fn logs_endpoint_returns_empty_history() {
    let harness = harness("logs");
    let config = WebhookConfig::new("inbound", "https://example.com/out").with_port(9104);
    let channel_id = inbound_channel(&harness, config).await;

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/webhooks/{channel_id}/logs?limit=5"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 0);
}
