// crates/datatrust-governance/src/health.rs
// ============================================================================
// Module: Connector Health Registry
// Description: Per-connector health records for admin reporting.
// Purpose: Track in-flight work, queue depth, and last success/error.
// Dependencies: serde, datatrust-core
// ============================================================================

//! ## Overview
//! The health registry keeps one record per connector: gauges for in-flight
//! operations and queued waiters, plus the last successful operation and the
//! last error. The admin status endpoint serializes these records verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use datatrust_core::Timestamp;
use serde::Serialize;

// ============================================================================
// SECTION: Health Records
// ============================================================================

/// Health record for one connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectorHealth {
    /// Operations currently executing.
    pub in_flight: u64,
    /// Waiters queued on the connector semaphore.
    pub queue_depth: u64,
    /// Timestamp of the last successful operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<Timestamp>,
    /// Timestamp of the last failed operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<Timestamp>,
    /// Message of the last failed operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Process-wide registry of connector health records.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    /// Records keyed by connector id.
    records: Mutex<BTreeMap<String, ConnectorHealth>>,
}

impl HealthRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a mutation against the record for a connector.
    fn update(&self, connector_id: &str, mutate: impl FnOnce(&mut ConnectorHealth)) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(records.entry(connector_id.to_string()).or_default());
    }

    /// Records a waiter entering the semaphore queue.
    pub fn enter_queue(&self, connector_id: &str) {
        self.update(connector_id, |health| {
            health.queue_depth = health.queue_depth.saturating_add(1);
        });
    }

    /// Records a waiter leaving the queue and starting execution.
    pub fn start_operation(&self, connector_id: &str) {
        self.update(connector_id, |health| {
            health.queue_depth = health.queue_depth.saturating_sub(1);
            health.in_flight = health.in_flight.saturating_add(1);
        });
    }

    /// Records a successful operation completion.
    pub fn finish_success(&self, connector_id: &str, at: Timestamp) {
        self.update(connector_id, |health| {
            health.in_flight = health.in_flight.saturating_sub(1);
            health.last_success = Some(at);
        });
    }

    /// Records a failed operation completion.
    pub fn finish_error(&self, connector_id: &str, at: Timestamp, message: &str) {
        self.update(connector_id, |health| {
            health.in_flight = health.in_flight.saturating_sub(1);
            health.last_error_at = Some(at);
            health.last_error = Some(message.to_string());
        });
    }

    /// Returns a copy of every health record.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ConnectorHealth> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::Timestamp;

    use super::HealthRegistry;

    #[test]
    fn gauges_track_queue_and_in_flight() {
        let registry = HealthRegistry::new();
        registry.enter_queue("csv-users");
        registry.start_operation("csv-users");
        let snapshot = registry.snapshot();
        let health = snapshot.get("csv-users").unwrap();
        assert_eq!(health.queue_depth, 0);
        assert_eq!(health.in_flight, 1);

        registry.finish_error("csv-users", Timestamp::from_millis(1), "boom");
        let snapshot = registry.snapshot();
        let health = snapshot.get("csv-users").unwrap();
        assert_eq!(health.in_flight, 0);
        assert_eq!(health.last_error.as_deref(), Some("boom"));
    }
}
