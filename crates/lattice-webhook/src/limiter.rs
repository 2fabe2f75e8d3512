//! Per-key token-bucket admission control.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter keyed by channel ID.
///
/// The first call for a key is pre-charged: the bucket starts at
/// `burst_size - 1` and the call is admitted. Tokens refill continuously at
/// `requests_per_minute`. All state lives under one mutex, held only for
/// O(1) arithmetic.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or deny one call for `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();

        let Some(bucket) = buckets.get_mut(key) else {
            buckets.insert(
                key.to_string(),
                TokenBucket {
                    tokens: self.config.burst_size.saturating_sub(1) as f64,
                    last_refill: now,
                },
            );
            return true;
        };

        let elapsed_minutes = now.duration_since(bucket.last_refill).as_secs_f64() / 60.0;
        let refill = elapsed_minutes * self.config.requests_per_minute as f64;
        bucket.tokens = (bucket.tokens + refill).min(self.config.burst_size as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(rpm: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_minute: rpm,
            burst_size: burst,
        })
    }

    #[test]
    fn test_burst_admits_exactly_burst_size() {
        let rl = limiter(60, 10);
        let now = Instant::now();

        for i in 0..10 {
            assert!(rl.allow_at("ch1", now), "call {} should be admitted", i + 1);
        }
        assert!(!rl.allow_at("ch1", now), "11th call should be denied");
    }

    #[test]
    fn test_refill_after_simulated_minute() {
        let rl = limiter(60, 10);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(rl.allow_at("ch1", start));
        }
        assert!(!rl.allow_at("ch1", start));

        // 60 simulated seconds refill one token per second at 60 rpm;
        // well more than the single token needed.
        let later = start + Duration::from_secs(60);
        assert!(rl.allow_at("ch1", later));
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let rl = limiter(60, 5);
        let start = Instant::now();
        assert!(rl.allow_at("ch1", start));

        // A long idle period must not accumulate beyond the burst size.
        let much_later = start + Duration::from_secs(3600);
        for _ in 0..5 {
            assert!(rl.allow_at("ch1", much_later));
        }
        assert!(!rl.allow_at("ch1", much_later));
    }

    #[test]
    fn test_keys_are_independent() {
        let rl = limiter(60, 1);
        let now = Instant::now();

        assert!(rl.allow_at("a", now));
        assert!(!rl.allow_at("a", now));
        assert!(rl.allow_at("b", now));
    }
}
