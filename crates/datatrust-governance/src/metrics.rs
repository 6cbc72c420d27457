// crates/datatrust-governance/src/metrics.rs
// ============================================================================
// Module: Governance Metrics
// Description: Observability hooks for governed connector operations.
// Purpose: Provide metric events without hard exporter dependencies.
// Dependencies: datatrust-core
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for governed connector
//! counters and duration observations. It is intentionally dependency-light
//! so deployments can plug in Prometheus or OpenTelemetry without redesign;
//! the server crate ships an atomic registry that renders the Prometheus
//! text exposition.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use datatrust_core::ConnectorOp;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Operation outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// Successful operation.
    Ok,
    /// Failed operation.
    Error,
}

impl OpOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for governed connector operations.
pub trait GovernanceMetrics: Send + Sync {
    /// Records an operation outcome and its duration.
    fn record_operation(
        &self,
        connector_id: &str,
        op: ConnectorOp,
        outcome: OpOutcome,
        duration: Duration,
    );

    /// Records time spent waiting for the connector semaphore.
    fn record_queue_wait(&self, connector_id: &str, wait: Duration);

    /// Records a retry attempt.
    fn record_retry(&self, connector_id: &str, op: ConnectorOp);

    /// Records a breaker fast-fail.
    fn record_breaker_rejection(&self, connector_id: &str, op: ConnectorOp);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopGovernanceMetrics;

impl GovernanceMetrics for NoopGovernanceMetrics {
    fn record_operation(
        &self,
        _connector_id: &str,
        _op: ConnectorOp,
        _outcome: OpOutcome,
        _duration: Duration,
    ) {
    }

    fn record_queue_wait(&self, _connector_id: &str, _wait: Duration) {}

    fn record_retry(&self, _connector_id: &str, _op: ConnectorOp) {}

    fn record_breaker_rejection(&self, _connector_id: &str, _op: ConnectorOp) {}
}
