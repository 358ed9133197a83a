//! Token-bucket rate limiting per (session, intent kind, action)

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use companion_policy::RateLimit;

/// One token bucket.
#[derive(Debug)]
struct Bucket {
    tokens: f32,
    last_refill: Instant,
}

/// Registry of token buckets, keyed by (session, intent kind, action).
///
/// Buckets refill continuously at the configured per-minute rate and cap at
/// the burst allowance.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one token for the key. Returns false when the bucket is dry.
    pub fn check(&self, session_id: &str, kind: &str, action: &str, limit: &RateLimit) -> bool {
        let key = format!("{}:{}:{}", session_id, kind, action);
        let capacity = limit.max_per_minute as f32 * limit.burst_multiplier;
        let per_second = limit.max_per_minute as f32 / 60.0;

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_insert(Bucket {
            tokens: capacity,
            last_refill: Instant::now(),
        });

        let elapsed = bucket.last_refill.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * per_second).min(capacity);
            bucket.last_refill = Instant::now();
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than `idle`. Called from the session
    /// cleanup task so the map stays bounded.
    pub fn prune(&self, idle: Duration) {
        self.buckets
            .lock()
            .retain(|_, bucket| bucket.last_refill.elapsed() < idle);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(per_minute: u32, burst: f32) -> RateLimit {
        RateLimit {
            max_per_minute: per_minute,
            burst_multiplier: burst,
        }
    }

    #[test]
    fn test_allows_up_to_burst() {
        let registry = RateLimiterRegistry::new();
        let limit = limit(10, 2.0);

        for _ in 0..20 {
            assert!(registry.check("s1", "smart.home", "on", &limit));
        }
        assert!(!registry.check("s1", "smart.home", "on", &limit));
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = RateLimiterRegistry::new();
        let limit = limit(1, 1.0);

        assert!(registry.check("s1", "smart.home", "on", &limit));
        assert!(!registry.check("s1", "smart.home", "on", &limit));

        // Different action and different session both have fresh buckets
        assert!(registry.check("s1", "smart.home", "off", &limit));
        assert!(registry.check("s2", "smart.home", "on", &limit));
    }

    #[test]
    fn test_prune_drops_idle_buckets() {
        let registry = RateLimiterRegistry::new();
        let limit = limit(10, 1.0);

        registry.check("s1", "smart.home", "on", &limit);
        assert_eq!(registry.len(), 1);

        registry.prune(Duration::from_secs(0));
        assert_eq!(registry.len(), 0);
    }
}
