// crates/datatrust-governance/src/breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Three-state breaker with single-probe half-open semantics.
// Purpose: Shed load from failing connectors and probe recovery safely.
// Dependencies: serde, std::sync
// ============================================================================

//! ## Overview
//! The breaker is closed while a connector is healthy, opens after a run of
//! failures, and admits exactly one probe request once the open window has
//! elapsed. A successful probe closes the breaker; a failed probe re-opens
//! it. Transitions are protected by a mutex; admission and feedback are the
//! only entry points.
//!
//! ## Invariants
//! - At most one request is in flight while half-open.
//! - After `open_ms` since opening, the next admission transitions to
//!   half-open instead of failing fast.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures in the closed state before opening.
    pub failure_threshold: u32,
    /// Time the breaker stays open before admitting a probe.
    pub open_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_ms: 30_000,
        }
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Breaker state tagged union.
///
/// # Invariants
/// - `HalfOpen` tracks whether the single probe slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    /// Healthy; counts consecutive failures.
    Closed {
        /// Consecutive failure count.
        failures: u32,
    },
    /// Shedding load since `opened_at`.
    Open {
        /// Instant the breaker opened.
        opened_at: Instant,
    },
    /// Probing recovery.
    HalfOpen {
        /// Whether the probe request is in flight.
        probe_in_flight: bool,
    },
}

/// Serializable snapshot of the breaker for errors and admin status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// State label: `closed`, `open`, or `half_open`.
    pub state: &'static str,
    /// Consecutive failures while closed.
    pub failures: u32,
    /// Milliseconds since the breaker opened, when open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_for_ms: Option<u64>,
    /// Milliseconds until a probe is admitted, when open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted in the closed state.
    Normal,
    /// Admitted as the half-open probe.
    Probe,
}

// ============================================================================
// SECTION: Breaker
// ============================================================================

/// Three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Configuration.
    config: BreakerConfig,
    /// Current state behind a mutex.
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::Closed {
                failures: 0,
            }),
        }
    }

    /// Attempts to admit a request.
    ///
    /// # Errors
    ///
    /// Returns a [`BreakerSnapshot`] when the request must fail fast.
    pub fn try_admit(&self) -> Result<Admission, BreakerSnapshot> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            BreakerState::Closed {
                ..
            } => Ok(Admission::Normal),
            BreakerState::Open {
                opened_at,
            } => {
                let elapsed = opened_at.elapsed();
                if elapsed >= Duration::from_millis(self.config.open_ms) {
                    *state = BreakerState::HalfOpen {
                        probe_in_flight: true,
                    };
                    Ok(Admission::Probe)
                } else {
                    Err(snapshot_of(&state, self.config.open_ms))
                }
            }
            BreakerState::HalfOpen {
                probe_in_flight,
            } => {
                if probe_in_flight {
                    Err(snapshot_of(&state, self.config.open_ms))
                } else {
                    *state = BreakerState::HalfOpen {
                        probe_in_flight: true,
                    };
                    Ok(Admission::Probe)
                }
            }
        }
    }

    /// Records a successful operation, closing the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::Closed {
            failures: 0,
        };
    }

    /// Records a failed operation.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            BreakerState::Closed {
                failures,
            } => {
                let failures = failures.saturating_add(1);
                if failures >= self.config.failure_threshold {
                    *state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = BreakerState::Closed {
                        failures,
                    };
                }
            }
            BreakerState::HalfOpen {
                ..
            } => {
                *state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
            }
            BreakerState::Open {
                ..
            } => {}
        }
    }

    /// Returns a serializable snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot_of(&state, self.config.open_ms)
    }
}

/// Renders a snapshot for the given state.
fn snapshot_of(state: &BreakerState, open_ms: u64) -> BreakerSnapshot {
    match state {
        BreakerState::Closed {
            failures,
        } => BreakerSnapshot {
            state: "closed",
            failures: *failures,
            open_for_ms: None,
            retry_after_ms: None,
        },
        BreakerState::Open {
            opened_at,
        } => {
            let elapsed = u64::try_from(opened_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            BreakerSnapshot {
                state: "open",
                failures: 0,
                open_for_ms: Some(elapsed),
                retry_after_ms: Some(open_ms.saturating_sub(elapsed)),
            }
        }
        BreakerState::HalfOpen {
            ..
        } => BreakerSnapshot {
            state: "half_open",
            failures: 0,
            open_for_ms: None,
            retry_after_ms: None,
        },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::Admission;
    use super::BreakerConfig;
    use super::CircuitBreaker;

    #[test]
    fn opens_at_failure_threshold() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            open_ms: 60_000,
        });
        for _ in 0..2 {
            breaker.record_failure();
            assert!(breaker.try_admit().is_ok());
        }
        breaker.record_failure();
        let rejected = breaker.try_admit();
        assert!(rejected.is_err());
        assert_eq!(rejected.unwrap_err().state, "open");
    }

    #[test]
    fn admits_single_probe_after_open_window() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            open_ms: 0,
        });
        breaker.record_failure();
        assert_eq!(breaker.try_admit().unwrap(), Admission::Probe);
        // Second request while the probe is in flight must fail fast.
        assert!(breaker.try_admit().is_err());
    }

    #[test]
    fn probe_success_closes_and_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            open_ms: 0,
        });
        breaker.record_failure();
        assert_eq!(breaker.try_admit().unwrap(), Admission::Probe);
        breaker.record_success();
        assert_eq!(breaker.try_admit().unwrap(), Admission::Normal);

        breaker.record_failure();
        assert_eq!(breaker.try_admit().unwrap(), Admission::Probe);
        breaker.record_failure();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, "open");
    }
}
