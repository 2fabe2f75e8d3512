//! Outbound webhook delivery with retry and backoff.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RetryConfig, WebhookConfig};
use crate::signature::{WebhookSigner, GENERIC_SIGNATURE_HEADER};
use crate::types::{DeliveryLog, DeliveryStatus};
use crate::WebhookError;

const USER_AGENT: &str = "Lattice-Webhook/1.0";
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// A failed delivery, carrying the terminal [`DeliveryLog`] so callers can
/// record it regardless of outcome.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub log: DeliveryLog,
    pub error: WebhookError,
}

/// Delivers payloads to the channel's target URL.
///
/// Retries are handled entirely here, up to `max_retries` beyond the
/// initial attempt; nothing above the sender retries again. Attempts for a
/// single send are strictly sequential; concurrent sends race
/// independently, each producing its own log.
pub struct Sender {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl Sender {
    /// Sender with the default pooled client (30 s per-attempt timeout).
    pub fn new(config: WebhookConfig) -> Self {
        Self::with_client(config, default_client())
    }

    /// Sender with an injected client, for tests and per-channel tuning.
    pub fn with_client(config: WebhookConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Deliver `payload`, retrying per the channel's [`RetryConfig`].
    ///
    /// Returns the terminal log on success; on failure the log travels in
    /// the [`DeliveryFailure`]. Cancellation during backoff or a round trip
    /// returns immediately without further network I/O.
    pub async fn send(
        &self,
        payload: &[u8],
        message_id: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<DeliveryLog, DeliveryFailure> {
        let mut log = DeliveryLog::new(&self.config.id, message_id);

        let Some(target_url) = self.config.target_url.as_deref() else {
            log.status = DeliveryStatus::Failed;
            log.error = Some("no target URL configured".to_string());
            return Err(DeliveryFailure {
                log,
                error: WebhookError::Config("no target URL configured".to_string()),
            });
        };

        let retry = self.config.retry;
        let mut last_error = WebhookError::Transport("no attempt made".to_string());

        for attempt in 0..=retry.max_retries {
            log.attempt = attempt + 1;
            log.status = DeliveryStatus::Retrying;

            if attempt > 0 {
                let delay = backoff(attempt, &retry);
                debug!(
                    channel_id = %self.config.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before retry"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(cancelled(log)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(log)),
                outcome = self.attempt(target_url, payload) => outcome,
            };

            let code = match outcome {
                Ok(code) => {
                    log.response_code = Some(code);
                    code
                }
                Err(err) => {
                    warn!(
                        channel_id = %self.config.id,
                        url = %target_url,
                        attempt = log.attempt,
                        error = %err,
                        "Webhook delivery attempt failed"
                    );
                    log.error = Some(err.to_string());
                    last_error = err;
                    0
                }
            };

            if code != 0 && code < 400 {
                log.status = DeliveryStatus::Delivered;
                info!(
                    channel_id = %self.config.id,
                    delivery_id = %log.id,
                    attempts = log.attempt,
                    "Webhook delivered"
                );
                return Ok(log);
            }

            if code != 0 {
                let err = WebhookError::Protocol(code);
                warn!(
                    channel_id = %self.config.id,
                    url = %target_url,
                    status = code,
                    attempt = log.attempt,
                    "Webhook delivery received error response"
                );
                log.error = Some(err.to_string());
                last_error = err;
            }

            // Transport failures, 5xx and 429 are retryable; any other
            // response ends the loop.
            if !should_retry(code) {
                break;
            }
        }

        log.status = DeliveryStatus::Failed;
        let attempts = log.attempt;
        Err(DeliveryFailure {
            log,
            error: WebhookError::DeliveryFailed {
                attempts,
                source: Box::new(last_error),
            },
        })
    }

    /// Serialize and deliver a JSON value.
    pub async fn send_json<T: Serialize>(
        &self,
        value: &T,
        message_id: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<DeliveryLog, DeliveryFailure> {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(err) => {
                let mut log = DeliveryLog::new(&self.config.id, message_id);
                log.status = DeliveryStatus::Failed;
                log.error = Some(err.to_string());
                return Err(DeliveryFailure {
                    log,
                    error: err.into(),
                });
            }
        };
        self.send(&payload, message_id, cancel).await
    }

    /// One HTTP POST. Returns the status code of any received response;
    /// transport-level failures become [`WebhookError::Transport`].
    async fn attempt(&self, url: &str, payload: &[u8]) -> crate::Result<u16> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT);

        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(secret) = self.config.secret.as_deref() {
            let signature = WebhookSigner::new(secret).sign(payload);
            request = request.header(GENERIC_SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|err| WebhookError::Transport(err.to_string()))?;

        Ok(response.status().as_u16())
    }
}

fn cancelled(mut log: DeliveryLog) -> DeliveryFailure {
    log.status = DeliveryStatus::Failed;
    log.error = Some("delivery cancelled during retry".to_string());
    DeliveryFailure {
        log,
        error: WebhookError::Cancelled,
    }
}

/// `min(base_delay * 2^(attempt-1), max_delay)`.
pub fn backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    config.base_delay.saturating_mul(factor).min(config.max_delay)
}

/// Retry on transport failure (code 0), server errors and 429.
pub fn should_retry(code: u16) -> bool {
    code == 0 || code >= 500 || code == 429
}

fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(ATTEMPT_TIMEOUT)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .expect("failed to build HTTP client")
}
