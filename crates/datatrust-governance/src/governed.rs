// crates/datatrust-governance/src/governed.rs
// ============================================================================
// Module: Governed Connector
// Description: Decorator applying breaker, semaphore, timeout, and retry.
// Purpose: Subject every connector operation to uniform resource governance.
// Dependencies: async-trait, tokio, datatrust-core, crate::{breaker, retry}
// ============================================================================

//! ## Overview
//! [`Governed`] wraps any [`Connector`] so every operation passes through,
//! in order: circuit-breaker admission, semaphore acquisition, a per-call
//! timeout, and retry with exponential backoff for idempotent operations.
//! Success and failure feed back into the breaker and the health registry;
//! counters and durations go to the metrics sink.
//!
//! ## Invariants
//! - Fast-fails while the breaker is open carry a breaker snapshot in the
//!   error context.
//! - Only idempotent operations are retried, and only on transient errors.
//! - Health gauges are balanced: one start per finish.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use datatrust_core::ConnectionState;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::ConnectorInfo;
use datatrust_core::ConnectorOp;
use datatrust_core::FilterOptions;
use datatrust_core::ReadResult;
use datatrust_core::Record;
use datatrust_core::Schema;
use datatrust_core::Timestamp;
use datatrust_core::ValidationReport;
use datatrust_core::WriteMode;
use datatrust_core::WriteResult;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::breaker::BreakerConfig;
use crate::breaker::BreakerSnapshot;
use crate::breaker::CircuitBreaker;
use crate::health::HealthRegistry;
use crate::metrics::GovernanceMetrics;
use crate::metrics::OpOutcome;
use crate::retry::RetryConfig;
use crate::retry::backoff_delay;
use crate::retry::is_retryable;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Governance configuration applied per connector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernanceConfig {
    /// Maximum concurrent operations.
    pub max_concurrency: usize,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retry policy for idempotent operations.
    pub retry: RetryConfig,
    /// Circuit-breaker policy.
    pub breaker: BreakerConfig,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            timeout_ms: 60_000,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

// ============================================================================
// SECTION: Governed Wrapper
// ============================================================================

/// Connector decorator applying resource governance uniformly.
pub struct Governed {
    /// Wrapped connector.
    inner: Arc<dyn Connector>,
    /// Connector identifier cached from the wrapped connector.
    connector_id: String,
    /// Governance configuration.
    config: GovernanceConfig,
    /// Concurrency gate.
    semaphore: Arc<Semaphore>,
    /// Circuit breaker.
    breaker: CircuitBreaker,
    /// Metrics sink.
    metrics: Arc<dyn GovernanceMetrics>,
    /// Health registry.
    health: Arc<HealthRegistry>,
}

impl Governed {
    /// Wraps a connector with governance.
    #[must_use]
    pub fn new(
        inner: Arc<dyn Connector>,
        config: GovernanceConfig,
        metrics: Arc<dyn GovernanceMetrics>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        let connector_id = inner.info().id;
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            breaker: CircuitBreaker::new(config.breaker),
            inner,
            connector_id,
            config,
            metrics,
            health,
        }
    }

    /// Returns the breaker snapshot for admin reporting.
    #[must_use]
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Runs one operation through the governance pipeline.
    async fn execute<T, F, Fut>(&self, op: ConnectorOp, run: F) -> Result<T, ConnectorError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, ConnectorError>> + Send,
    {
        if let Err(snapshot) = self.breaker.try_admit() {
            self.metrics.record_breaker_rejection(&self.connector_id, op);
            return Err(ConnectorError::new(
                ConnectorErrorKind::ConnectionFailed,
                format!("circuit breaker is open for connector `{}`", self.connector_id),
            )
            .with_connector(self.connector_id.clone())
            .with_suggestion("wait for the breaker window to elapse before retrying")
            .with_context("breaker", serde_json::to_value(&snapshot).unwrap_or(json!(null))));
        }

        self.health.enter_queue(&self.connector_id);
        let queue_start = Instant::now();
        let permit = self.semaphore.acquire().await.map_err(|_| {
            ConnectorError::new(
                ConnectorErrorKind::Unknown,
                format!("connector `{}` is shutting down", self.connector_id),
            )
        })?;
        self.metrics.record_queue_wait(&self.connector_id, queue_start.elapsed());
        self.health.start_operation(&self.connector_id);

        let started = Instant::now();
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut attempt: u32 = 0;
        let outcome = loop {
            let result = match tokio::time::timeout(timeout, run()).await {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::new(
                    ConnectorErrorKind::Timeout,
                    format!(
                        "operation `{op}` timed out after {} ms",
                        self.config.timeout_ms
                    ),
                )
                .with_connector(self.connector_id.clone())
                .with_suggestion("raise timeout_ms or reduce the request size")
                .with_context("operation", json!(op.as_str()))
                .with_context("timeout_ms", json!(self.config.timeout_ms))),
            };
            match result {
                Ok(value) => break Ok(value),
                Err(error) => {
                    let retries_left = attempt.saturating_add(1) < self.config.retry.max_attempts;
                    if op.idempotent() && retries_left && is_retryable(&error) {
                        self.metrics.record_retry(&self.connector_id, op);
                        tokio::time::sleep(backoff_delay(&self.config.retry, attempt)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    break Err(error);
                }
            }
        };
        drop(permit);

        let duration = started.elapsed();
        match &outcome {
            Ok(_) => {
                self.breaker.record_success();
                self.health.finish_success(&self.connector_id, Timestamp::now());
                self.metrics.record_operation(&self.connector_id, op, OpOutcome::Ok, duration);
            }
            Err(error) => {
                self.breaker.record_failure();
                self.health.finish_error(&self.connector_id, Timestamp::now(), &error.message);
                self.metrics.record_operation(&self.connector_id, op, OpOutcome::Error, duration);
            }
        }
        outcome
    }
}

#[async_trait]
impl Connector for Governed {
    fn info(&self) -> ConnectorInfo {
        self.inner.info()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        self.execute(ConnectorOp::Connect, || self.inner.connect()).await
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.execute(ConnectorOp::Disconnect, || self.inner.disconnect()).await
    }

    async fn get_schema(&self, force_refresh: bool) -> Result<Schema, ConnectorError> {
        self.execute(ConnectorOp::GetSchema, || self.inner.get_schema(force_refresh)).await
    }

    async fn read_records(&self, filter: &FilterOptions) -> Result<ReadResult, ConnectorError> {
        self.execute(ConnectorOp::ReadRecords, || self.inner.read_records(filter)).await
    }

    async fn write_records(
        &self,
        records: &[Record],
        mode: WriteMode,
    ) -> Result<WriteResult, ConnectorError> {
        self.execute(ConnectorOp::WriteRecords, || self.inner.write_records(records, mode)).await
    }

    async fn validate_records(
        &self,
        records: &[Record],
    ) -> Result<ValidationReport, ConnectorError> {
        self.execute(ConnectorOp::ValidateRecords, || self.inner.validate_records(records)).await
    }

    async fn test_connection(&self) -> Result<(), ConnectorError> {
        self.execute(ConnectorOp::TestConnection, || self.inner.test_connection()).await
    }
}
