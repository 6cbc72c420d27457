// crates/datatrust-governance/src/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Retry classification and exponential backoff with jitter.
// Purpose: Retry transient connector failures on idempotent operations only.
// Dependencies: rand, datatrust-core
// ============================================================================

//! ## Overview
//! Retries apply only to idempotent connector operations and only to
//! transient error classes: timeout, connection failure, rate limiting, or
//! a transport-layer code from the retryable set. Backoff doubles from a
//! 200 ms base up to a 5 s cap with ±20 % jitter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use rand::Rng;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Transport-layer codes treated as transient.
pub const RETRYABLE_TRANSPORT_CODES: &[&str] =
    &["ETIMEDOUT", "ECONNRESET", "ECONNREFUSED", "EAI_AGAIN"];

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter fraction applied symmetrically (0.2 = ±20 %).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: 0.2,
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Returns true when the error class is transient and safe to retry.
#[must_use]
pub fn is_retryable(error: &ConnectorError) -> bool {
    if matches!(
        error.kind,
        ConnectorErrorKind::Timeout
            | ConnectorErrorKind::ConnectionFailed
            | ConnectorErrorKind::RateLimited
    ) {
        return true;
    }
    error
        .transport_code()
        .is_some_and(|code| RETRYABLE_TRANSPORT_CODES.contains(&code))
}

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Computes the backoff delay before the given retry attempt.
///
/// `attempt` is zero-based: the delay before the first retry uses the base
/// delay, doubling for each subsequent retry, capped, then jittered.
#[must_use]
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.min(31);
    let raw = config.base_delay_ms.saturating_mul(1_u64 << exponent);
    let capped = raw.min(config.max_delay_ms);
    let jitter_span = (capped as f64 * config.jitter).round();
    let jittered = if jitter_span > 0.0 {
        let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        (capped as f64 + offset).max(0.0)
    } else {
        capped as f64
    };
    // Delay values are far below 2^53, so the cast is lossless in practice.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Jittered delay is clamped non-negative and bounded by max_delay_ms."
    )]
    Duration::from_millis(jittered as u64)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::ConnectorError;
    use datatrust_core::ConnectorErrorKind;
    use serde_json::json;

    use super::RetryConfig;
    use super::backoff_delay;
    use super::is_retryable;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(is_retryable(&ConnectorError::new(ConnectorErrorKind::Timeout, "t")));
        assert!(is_retryable(&ConnectorError::new(ConnectorErrorKind::RateLimited, "r")));
        assert!(!is_retryable(&ConnectorError::new(ConnectorErrorKind::ValidationError, "v")));
    }

    #[test]
    fn transport_codes_are_retryable() {
        let error = ConnectorError::new(ConnectorErrorKind::Unknown, "socket")
            .with_context("transport_code", json!("ECONNRESET"));
        assert!(is_retryable(&error));
        let other = ConnectorError::new(ConnectorErrorKind::Unknown, "socket")
            .with_context("transport_code", json!("EPIPE"));
        assert!(!is_retryable(&other));
    }

    #[test]
    fn backoff_doubles_and_caps_within_jitter_bounds() {
        let config = RetryConfig::default();
        for (attempt, nominal) in [(0_u32, 200_u64), (1, 400), (2, 800), (5, 5_000), (10, 5_000)] {
            let delay = backoff_delay(&config, attempt).as_millis();
            let low = u128::from(nominal) * 8 / 10;
            let high = u128::from(nominal) * 12 / 10;
            assert!(
                delay >= low && delay <= high,
                "attempt {attempt}: delay {delay} outside [{low}, {high}]"
            );
        }
    }
}
