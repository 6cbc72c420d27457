// crates/datatrust-governance/src/lib.rs
// ============================================================================
// Module: DataTrust Governance
// Description: Resource governance decorator for connectors.
// Purpose: Apply breaker, semaphore, timeout, and retry uniformly.
// Dependencies: async-trait, datatrust-core, rand, serde, tokio
// ============================================================================

//! ## Overview
//! This crate wraps any connector in a governance pipeline: circuit-breaker
//! admission, bounded concurrency, per-call timeouts, and retry with
//! exponential backoff for idempotent operations. It also owns the
//! connector-health registry and the dependency-light metrics interface the
//! server renders as Prometheus text.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod breaker;
pub mod governed;
pub mod health;
pub mod metrics;
pub mod retry;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use breaker::BreakerConfig;
pub use breaker::BreakerSnapshot;
pub use breaker::CircuitBreaker;
pub use governed::GovernanceConfig;
pub use governed::Governed;
pub use health::ConnectorHealth;
pub use health::HealthRegistry;
pub use metrics::GovernanceMetrics;
pub use metrics::NoopGovernanceMetrics;
pub use metrics::OpOutcome;
pub use retry::RetryConfig;
pub use retry::is_retryable;
