// crates/datatrust-server/src/metrics.rs
// ============================================================================
// Module: Metrics Registry
// Description: Process-wide counters, gauges, and duration summaries.
// Purpose: Back the Prometheus exposition endpoint and governance hooks.
// Dependencies: datatrust-core, datatrust-governance
// ============================================================================

//! ## Overview
//! A mutex-guarded map registry: counters and gauges keyed by rendered
//! label sets, duration summaries as count plus sum-of-seconds. The
//! `/metrics` endpoint renders the Prometheus text exposition. The registry
//! also implements the governance metrics trait so governed connectors
//! report through the same surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use datatrust_core::ConnectorOp;
use datatrust_governance::GovernanceMetrics;
use datatrust_governance::OpOutcome;

use crate::telemetry::ToolOutcome;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Duration summary cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Summary {
    /// Observation count.
    count: u64,
    /// Sum of observed seconds.
    sum_seconds: f64,
}

/// Process-wide metrics registry.
#[derive(Default)]
pub struct MetricsRegistry {
    /// Monotonic counters keyed by `name{labels}`.
    counters: Mutex<BTreeMap<String, u64>>,
    /// Gauges keyed by `name{labels}`.
    gauges: Mutex<BTreeMap<String, i64>>,
    /// Duration summaries keyed by `name{labels}`.
    summaries: Mutex<BTreeMap<String, Summary>>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments a counter cell.
    pub fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        let key = render_key(name, labels);
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters.entry(key).or_insert(0) += 1;
    }

    /// Sets a gauge cell.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = render_key(name, labels);
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        gauges.insert(key, value);
    }

    /// Observes a duration in a summary cell.
    pub fn observe_duration(&self, name: &str, labels: &[(&str, &str)], duration: Duration) {
        let key = render_key(name, labels);
        let mut summaries = self.summaries.lock().unwrap_or_else(PoisonError::into_inner);
        let cell = summaries.entry(key).or_default();
        cell.count += 1;
        cell.sum_seconds += duration.as_secs_f64();
    }

    /// Records a tool invocation outcome and duration.
    pub fn record_tool(&self, tool: &str, outcome: ToolOutcome, duration: Duration) {
        self.inc_counter(
            "datatrust_tool_calls_total",
            &[("tool", tool), ("outcome", outcome.as_str())],
        );
        self.observe_duration("datatrust_tool_duration_seconds", &[("tool", tool)], duration);
    }

    /// Records time spent waiting on the global tool semaphore.
    pub fn record_tool_queue_wait(&self, tool: &str, wait: Duration) {
        self.observe_duration("datatrust_tool_queue_wait_seconds", &[("tool", tool)], wait);
    }

    /// Renders the Prometheus text exposition.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for (key, value) in counters {
            let _ = writeln!(output, "{key} {value}");
        }
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for (key, value) in gauges {
            let _ = writeln!(output, "{key} {value}");
        }
        let summaries = self.summaries.lock().unwrap_or_else(PoisonError::into_inner).clone();
        for (key, cell) in summaries {
            let (name, labels) = split_key(&key);
            let _ = writeln!(output, "{name}_count{labels} {}", cell.count);
            let _ = writeln!(output, "{name}_sum{labels} {}", cell.sum_seconds);
        }
        output
    }
}

/// Renders `name{label="value",...}`.
fn render_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(label, value)| format!("{label}=\"{}\"", escape_label(value)))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

/// Escapes backslashes and quotes in label values.
fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Splits a rendered key back into name and label block.
fn split_key(key: &str) -> (&str, &str) {
    key.find('{').map_or((key, ""), |index| key.split_at(index))
}

// ============================================================================
// SECTION: Governance Bridge
// ============================================================================

impl GovernanceMetrics for MetricsRegistry {
    fn record_operation(
        &self,
        connector_id: &str,
        op: ConnectorOp,
        outcome: OpOutcome,
        duration: Duration,
    ) {
        self.inc_counter(
            "datatrust_connector_ops_total",
            &[("connector", connector_id), ("op", op.as_str()), ("outcome", outcome.as_str())],
        );
        self.observe_duration(
            "datatrust_connector_op_duration_seconds",
            &[("connector", connector_id), ("op", op.as_str())],
            duration,
        );
    }

    fn record_queue_wait(&self, connector_id: &str, wait: Duration) {
        self.observe_duration(
            "datatrust_connector_queue_wait_seconds",
            &[("connector", connector_id)],
            wait,
        );
    }

    fn record_retry(&self, connector_id: &str, op: ConnectorOp) {
        self.inc_counter(
            "datatrust_connector_retries_total",
            &[("connector", connector_id), ("op", op.as_str())],
        );
    }

    fn record_breaker_rejection(&self, connector_id: &str, op: ConnectorOp) {
        self.inc_counter(
            "datatrust_connector_breaker_rejections_total",
            &[("connector", connector_id), ("op", op.as_str())],
        );
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use std::time::Duration;

    use crate::telemetry::ToolOutcome;

    use super::MetricsRegistry;

    #[test]
    fn exposition_renders_counters_and_summaries() {
        let registry = MetricsRegistry::new();
        registry.record_tool("read_records", ToolOutcome::Ok, Duration::from_millis(50));
        registry.record_tool("read_records", ToolOutcome::Ok, Duration::from_millis(150));
        registry.record_tool("write_records", ToolOutcome::Denied, Duration::from_millis(1));
        registry.set_gauge("datatrust_connectors", &[], 3);

        let text = registry.render_prometheus();
        assert!(text.contains(
            "datatrust_tool_calls_total{tool=\"read_records\",outcome=\"ok\"} 2"
        ));
        assert!(text.contains(
            "datatrust_tool_duration_seconds_count{tool=\"read_records\"} 2"
        ));
        assert!(text.contains("datatrust_connectors 3"));
    }

    #[test]
    fn label_values_are_escaped() {
        let registry = MetricsRegistry::new();
        registry.inc_counter("weird", &[("value", "a\"b\\c")]);
        let text = registry.render_prometheus();
        assert!(text.contains("weird{value=\"a\\\"b\\\\c\"} 1"));
    }
}
