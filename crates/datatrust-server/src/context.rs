// crates/datatrust-server/src/context.rs
// ============================================================================
// Module: Telemetry Context
// Description: Per-call context threaded through the dispatch pipeline.
// Purpose: Attach consistent identifiers to logs and audit without globals.
// Dependencies: datatrust-core
// ============================================================================

//! ## Overview
//! The telemetry context is built once at dispatch entry and passed by
//! reference into every sub-operation, so deeply nested work can attach the
//! trace id, decision id, identity, and break-glass flag to log records and
//! audit entries without task-local state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::DecisionId;
use datatrust_core::Identity;
use datatrust_core::MaskSet;
use datatrust_core::TraceId;
use rand::RngCore;
use rand::rngs::OsRng;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Per-call telemetry context.
///
/// # Invariants
/// - `trace_id` and `decision_id` are set before any sub-operation runs.
#[derive(Debug, Clone)]
pub struct TelemetryContext {
    /// Trace identifier, inherited or minted.
    pub trace_id: TraceId,
    /// Tool name.
    pub tool: String,
    /// Connector ids touched by the call.
    pub connectors: Vec<String>,
    /// Policy decision identifier.
    pub decision_id: DecisionId,
    /// Mask set resolved by policy evaluation.
    pub mask: MaskSet,
    /// Authenticated identity.
    pub identity: Identity,
    /// Whether break-glass was honoured.
    pub break_glass: bool,
    /// Remote peer address when the call arrived over HTTP.
    pub remote_ip: Option<String>,
}

/// Mints a fresh random trace identifier.
#[must_use]
pub fn mint_trace_id() -> TraceId {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    // The all-zero trace id is reserved by the trace-context format.
    if bytes.iter().all(|byte| *byte == 0) {
        bytes[15] = 1;
    }
    TraceId::from_bytes(bytes)
}

/// Mints a fresh decision identifier.
#[must_use]
pub fn mint_decision_id() -> DecisionId {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    let mut rendered = String::with_capacity(20);
    rendered.push_str("dec-");
    for byte in bytes {
        rendered.push_str(&format!("{byte:02x}"));
    }
    DecisionId::new(rendered)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::mint_decision_id;
    use super::mint_trace_id;

    #[test]
    fn minted_identifiers_are_well_formed_and_distinct() {
        let trace = mint_trace_id();
        assert_eq!(trace.as_str().len(), 32);
        assert_ne!(mint_trace_id(), trace);

        let decision = mint_decision_id();
        assert!(decision.as_str().starts_with("dec-"));
        assert_ne!(mint_decision_id(), decision);
    }
}
