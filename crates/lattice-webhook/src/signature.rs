//! HMAC signature generation and verification.
//!
//! Outbound requests are always signed the same way: `sha256=` followed by
//! the base64 HMAC-SHA256 of the body. Inbound verification accepts three
//! independent header formats (timestamped, hex-prefixed, generic) for
//! interoperability with common webhook producers.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Result, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the timestamped (`t=...,v1=...`) signature format.
pub const TIMESTAMPED_SIGNATURE_HEADER: &str = "Stripe-Signature";
/// Header carrying the hex `sha256=`-prefixed signature format.
pub const HEX_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
/// Header carrying the generic signature format; also used for outbound
/// signing.
pub const GENERIC_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Maximum age accepted for timestamped signatures.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Signs outbound payloads with the channel secret.
pub struct WebhookSigner {
    secret: Vec<u8>,
}

impl WebhookSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Header value for a signed payload: `sha256=<base64 HMAC>`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mac = compute_hmac(&self.secret, payload);
        format!("sha256={}", BASE64.encode(mac))
    }
}

fn compute_hmac(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Verify a `t=<unix-seconds>,v1=<hex-hmac>` header over `"<t>.<body>"`.
///
/// Rejects timestamps older than five minutes.
pub fn verify_timestamped(
    secret: &str,
    header: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<()> {
    let mut timestamp: Option<&str> = None;
    let mut signature: Option<&str> = None;

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = Some(value),
            (Some("v1"), Some(value)) => signature = Some(value),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => {
            return Err(WebhookError::Auth(
                "invalid timestamped signature format".to_string(),
            ))
        }
    };

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::Auth("invalid signature timestamp".to_string()))?;

    if now.timestamp() - ts > TIMESTAMP_TOLERANCE_SECS {
        return Err(WebhookError::Auth("signature timestamp too old".to_string()));
    }

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(body);

    let expected = hex::encode(compute_hmac(secret.as_bytes(), &signed));
    if constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookError::Auth("signature mismatch".to_string()))
    }
}

/// Verify a `sha256=<hex-hmac>` header computed over the raw body. The
/// prefix is optional; a bare hex value is accepted.
pub fn verify_hex_prefixed(secret: &str, header: &str, body: &[u8]) -> Result<()> {
    let signature = header.strip_prefix("sha256=").unwrap_or(header);

    let expected = hex::encode(compute_hmac(secret.as_bytes(), body));
    if constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(WebhookError::Auth("signature mismatch".to_string()))
    }
}

/// Verify a generic header: optional `sha256=` prefix, hex or base64 HMAC
/// over the raw body.
pub fn verify_generic(secret: &str, header: &str, body: &[u8]) -> Result<()> {
    let signature = header.strip_prefix("sha256=").unwrap_or(header);
    let mac = compute_hmac(secret.as_bytes(), body);

    let expected_hex = hex::encode(&mac);
    if constant_time_eq(signature.as_bytes(), expected_hex.as_bytes()) {
        return Ok(());
    }

    let expected_b64 = BASE64.encode(&mac);
    if constant_time_eq(signature.as_bytes(), expected_b64.as_bytes()) {
        return Ok(());
    }

    Err(WebhookError::Auth("signature mismatch".to_string()))
}

/// Constant-time comparison to avoid leaking match length via timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn hex_hmac(secret: &str, data: &[u8]) -> String {
        hex::encode(compute_hmac(secret.as_bytes(), data))
    }

    #[test]
    fn test_outbound_signature_is_base64_prefixed() {
        let signer = WebhookSigner::new("s");
        let value = signer.sign(b"{}");

        let encoded = value.strip_prefix("sha256=").unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(decoded, compute_hmac(b"s", b"{}"));
    }

    #[test]
    fn test_outbound_signature_verifies_as_generic() {
        let signer = WebhookSigner::new("k");
        let value = signer.sign(b"payload");
        verify_generic("k", &value, b"payload").unwrap();
    }

    #[test]
    fn test_hex_prefixed_round_trip_and_bit_flip() {
        let header = format!("sha256={}", hex_hmac("s", b"{}"));
        verify_hex_prefixed("s", &header, b"{}").unwrap();

        // Flipping any single hex character must fail verification.
        let mut corrupted = header.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'0' { b'1' } else { b'0' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(verify_hex_prefixed("s", &corrupted, b"{}").is_err());
    }

    #[test]
    fn test_hex_prefixed_accepts_bare_value() {
        let bare = hex_hmac("s", b"{}");
        verify_hex_prefixed("s", &bare, b"{}").unwrap();
        assert!(verify_hex_prefixed("s", &hex_hmac("other", b"{}"), b"{}").is_err());
    }

    #[test]
    fn test_timestamped_round_trip() {
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let signed = format!("{}.{}", ts, "{\"a\":1}");
        let header = format!("t={},v1={}", ts, hex_hmac("k", signed.as_bytes()));

        verify_timestamped("k", &header, b"{\"a\":1}", now).unwrap();
    }

    #[test]
    fn test_timestamped_rejects_stale() {
        let now = Utc::now();
        let old = now - Duration::seconds(600);
        let ts = old.timestamp().to_string();
        let signed = format!("{}.{}", ts, "{}");
        let header = format!("t={},v1={}", ts, hex_hmac("k", signed.as_bytes()));

        let err = verify_timestamped("k", &header, b"{}", now).unwrap_err();
        assert!(matches!(err, WebhookError::Auth(_)));
    }

    #[test]
    fn test_timestamped_rejects_wrong_secret() {
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let signed = format!("{}.{}", ts, "{}");
        let header = format!("t={},v1={}", ts, hex_hmac("other", signed.as_bytes()));

        assert!(verify_timestamped("k", &header, b"{}", now).is_err());
    }

    #[test]
    fn test_generic_accepts_hex_and_base64() {
        let mac = compute_hmac(b"k", b"body");

        verify_generic("k", &hex::encode(&mac), b"body").unwrap();
        verify_generic("k", &BASE64.encode(&mac), b"body").unwrap();
        verify_generic("k", &format!("sha256={}", hex::encode(&mac)), b"body").unwrap();
        assert!(verify_generic("k", "sha256=deadbeef", b"body").is_err());
    }
}
