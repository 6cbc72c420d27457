// crates/datatrust-server/src/rate_limit.rs
// ============================================================================
// Module: Rate Limiter
// Description: In-memory fixed-window request limiting.
// Purpose: Bound request rates per IP, subject, or both.
// Dependencies: datatrust-config
// ============================================================================

//! ## Overview
//! A fixed window per key: the first request in a window stores the reset
//! instant, later requests increment the count, and the count resets
//! exactly at the stored instant. Decisions carry the header values the
//! transport emits (`X-RateLimit-*`, `Retry-After`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use datatrust_config::RateLimitConfig;
use datatrust_config::RateLimitKey;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Configured window limit.
    pub limit: u64,
    /// Requests remaining in the window.
    pub remaining: u64,
    /// Seconds until the window resets.
    pub reset_seconds: u64,
}

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// One window bucket.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Instant the window resets.
    reset_at: Instant,
    /// Requests counted in the window.
    count: u64,
}

/// In-memory fixed-window rate limiter.
pub struct RateLimiter {
    /// Configuration.
    config: RateLimitConfig,
    /// Buckets keyed by discriminator.
    buckets: Mutex<BTreeMap<String, Bucket>>,
}

impl RateLimiter {
    /// Creates a limiter from configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Builds the bucket key for a request.
    #[must_use]
    pub fn key_for(&self, remote_ip: &str, subject: Option<&str>) -> String {
        match self.config.key {
            RateLimitKey::Ip => remote_ip.to_string(),
            RateLimitKey::Subject => subject.unwrap_or("anonymous").to_string(),
            RateLimitKey::IpSubject => {
                format!("{remote_ip}|{}", subject.unwrap_or("anonymous"))
            }
        }
    }

    /// Checks and counts one request.
    #[must_use]
    pub fn check(&self, key: &str) -> RateDecision {
        let window = Duration::from_secs(self.config.window_seconds);
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            reset_at: now + window,
            count: 0,
        });
        if now >= bucket.reset_at {
            bucket.reset_at = now + window;
            bucket.count = 0;
        }
        let reset_seconds = bucket.reset_at.saturating_duration_since(now).as_secs().max(1);
        if bucket.count >= self.config.limit {
            return RateDecision {
                allowed: false,
                limit: self.config.limit,
                remaining: 0,
                reset_seconds,
            };
        }
        bucket.count += 1;
        RateDecision {
            allowed: true,
            limit: self.config.limit,
            remaining: self.config.limit - bucket.count,
            reset_seconds,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
