//! Per-client rate limiting
//!
//! Token bucket keyed by client IP. Buckets refill lazily on access; a
//! periodic sweep under the same mutex drops buckets idle longer than the
//! configured window so the map stays bounded.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use driveshard_core::config::RateLimitConfig;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

struct Inner {
    buckets: HashMap<IpAddr, Bucket>,
    last_gc: Instant,
}

/// Token-bucket limiter keyed by client IP
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    idle_ttl: Duration,
    gc_interval: Duration,
    inner: Mutex<Inner>,
}

impl RateLimiter {
    /// Build from the config section
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.capacity,
            config.refill_per_sec,
            Duration::from_secs(config.idle_gc_secs),
        )
    }

    /// Build with explicit parameters
    pub fn new(capacity: u32, refill_per_sec: f64, idle_ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1) as f64,
            refill_per_sec,
            idle_ttl,
            gc_interval: idle_ttl.min(Duration::from_secs(60)),
            inner: Mutex::new(Inner {
                buckets: HashMap::new(),
                last_gc: Instant::now(),
            }),
        }
    }

    /// Take one token for `ip`; false means the request should be rejected
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        if now.duration_since(inner.last_gc) >= self.gc_interval {
            let ttl = self.idle_ttl;
            inner
                .buckets
                .retain(|_, bucket| now.duration_since(bucket.last_seen) < ttl);
            inner.last_gc = now;
        }

        let bucket = inner.buckets.entry(ip).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            bucket.last_refill = now;
        }
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Number of live buckets (for tests)
    pub fn tracked_clients(&self) -> usize {
        self.inner.lock().unwrap().buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn test_burst_up_to_capacity_then_reject() {
        let limiter = RateLimiter::new(3, 0.0, Duration::from_secs(300));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, 0.0, Duration::from_secs(300));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
        assert!(limiter.allow(ip(2)));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_refill_restores_tokens() {
        let limiter = RateLimiter::new(1, 1000.0, Duration::from_secs(300));
        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.allow(ip(1)));
    }

    #[test]
    fn test_idle_buckets_are_collected() {
        let limiter = RateLimiter::new(5, 0.0, Duration::from_millis(1));
        assert!(limiter.allow(ip(1)));
        assert_eq!(limiter.tracked_clients(), 1);

        std::thread::sleep(Duration::from_millis(5));
        // the next call sweeps the idle bucket before inserting its own
        assert!(limiter.allow(ip(2)));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
