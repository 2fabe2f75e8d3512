//! Inbound webhook path: admission, authentication, normalization.

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::limiter::RateLimiter;
use crate::signature::{
    verify_generic, verify_hex_prefixed, verify_timestamped, GENERIC_SIGNATURE_HEADER,
    HEX_SIGNATURE_HEADER, TIMESTAMPED_SIGNATURE_HEADER,
};
use crate::types::{generate_id, IncomingWebhook};
use crate::{Result, WebhookError};

/// Authenticates and normalizes inbound HTTP calls for one channel.
pub struct Receiver {
    config: WebhookConfig,
    rate_limiter: RateLimiter,
}

impl Receiver {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(Default::default()),
            config,
        }
    }

    /// Process one inbound call.
    ///
    /// Admission, method and signature checks each fail with their own
    /// typed error so the HTTP layer can map them to status codes.
    pub fn handle(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<IncomingWebhook> {
        if !self.rate_limiter.allow(&self.config.id) {
            warn!(channel_id = %self.config.id, "Inbound webhook rate limited");
            return Err(WebhookError::RateLimited(self.config.id.clone()));
        }

        if method != Method::POST {
            return Err(WebhookError::MethodNotAllowed(method.to_string()));
        }

        if let Some(secret) = self.config.secret.as_deref() {
            self.verify_signature(secret, headers, body)?;
        }

        debug!(channel_id = %self.config.id, bytes = body.len(), "Accepted inbound webhook");

        Ok(IncomingWebhook {
            id: generate_id("in"),
            channel_id: self.config.id.clone(),
            payload: body.to_vec(),
            headers: flatten_headers(headers),
            timestamp: Utc::now(),
        })
    }

    /// Try the three signature formats in fixed order, accepting the first
    /// match. Callers do not declare which format they used; this leniency
    /// is preserved for compatibility with existing producers.
    fn verify_signature(&self, secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        if let Some(header) = header_str(headers, TIMESTAMPED_SIGNATURE_HEADER) {
            if verify_timestamped(secret, header, body, Utc::now()).is_ok() {
                return Ok(());
            }
        }

        if let Some(header) = header_str(headers, HEX_SIGNATURE_HEADER) {
            if verify_hex_prefixed(secret, header, body).is_ok() {
                return Ok(());
            }
        }

        if let Some(header) = header_str(headers, GENERIC_SIGNATURE_HEADER) {
            if verify_generic(secret, header, body).is_ok() {
                return Ok(());
            }
        }

        warn!(channel_id = %self.config.id, "Inbound webhook failed signature verification");
        Err(WebhookError::Auth("no valid signature found".to_string()))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Flatten to a first-value-per-name map.
fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            flat.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    flat
}
