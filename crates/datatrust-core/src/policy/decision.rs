// crates/datatrust-core/src/policy/decision.rs
// ============================================================================
// Module: Policy Decision Records
// Description: Hash-chained decision records for the policy audit trail.
// Purpose: Capture every evaluation outcome in a tamper-evident form.
// Dependencies: serde, crate::{hashing, identifiers, time, policy}
// ============================================================================

//! ## Overview
//! Every policy evaluation produces a decision record. Records are appended
//! to daily files and hash-chained: each record stores its predecessor's
//! hash and its own hash, computed as SHA-256 over the previous hash
//! concatenated with the record's JSON bytes (hash fields excluded). The
//! genesis previous hash is the literal `"0"`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::hashing::chain_hash;
use crate::identifiers::DecisionId;
use crate::identifiers::TraceId;
use crate::policy::PolicyAction;
use crate::policy::engine::ApprovedBy;
use crate::policy::engine::RequestSummary;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Decision Core
// ============================================================================

/// Decision record fields covered by the chain hash.
///
/// # Invariants
/// - Serialization order is fixed by field order; hashing depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCore {
    /// Decision identifier.
    pub decision_id: DecisionId,
    /// Trace identifier of the originating call.
    pub trace_id: TraceId,
    /// Policy version string in effect.
    pub policy_version: String,
    /// Evaluation timestamp.
    pub timestamp: Timestamp,
    /// Tool name.
    pub tool: String,
    /// Connector ids in the request.
    pub connectors: Vec<String>,
    /// Final decision.
    pub decision: PolicyAction,
    /// Reason string; non-empty for denials.
    pub reason: String,
    /// Identifier of the rule that decided, when one matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Authenticated subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Authenticated tenant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    /// Whether break-glass was honoured.
    pub break_glass: bool,
    /// Approval path for writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_approved_by: Option<ApprovedBy>,
    /// Request summary.
    pub request: RequestSummary,
}

// ============================================================================
// SECTION: Sealed Record
// ============================================================================

/// Hash-chained decision record as persisted.
///
/// # Invariants
/// - `hash` equals `SHA-256(prev_hash || JSON(core))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Fields covered by the hash.
    #[serde(flatten)]
    pub core: DecisionCore,
    /// Hash of the preceding record, or `"0"` for the first entry.
    pub prev_hash: String,
    /// Hash of this record.
    pub hash: String,
}

impl DecisionRecord {
    /// Seals a decision core onto the chain.
    ///
    /// # Errors
    ///
    /// Returns the serialization error when the core cannot be encoded.
    pub fn seal(core: DecisionCore, prev_hash: &str) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(&core)?;
        let hash = chain_hash(prev_hash, &bytes);
        Ok(Self {
            core,
            prev_hash: prev_hash.to_string(),
            hash,
        })
    }

    /// Recomputes and checks this record's hash against the stored value.
    ///
    /// # Errors
    ///
    /// Returns the serialization error when the core cannot be encoded.
    pub fn verify(&self) -> Result<bool, serde_json::Error> {
        let bytes = serde_json::to_vec(&self.core)?;
        Ok(chain_hash(&self.prev_hash, &bytes) == self.hash)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use crate::hashing::GENESIS_PREV_HASH;
    use crate::identifiers::DecisionId;
    use crate::identifiers::TraceId;
    use crate::policy::PolicyAction;
    use crate::policy::engine::RequestSummary;
    use crate::time::Timestamp;

    use super::DecisionCore;
    use super::DecisionRecord;

    fn core(decision_id: &str) -> DecisionCore {
        DecisionCore {
            decision_id: DecisionId::new(decision_id),
            trace_id: TraceId::from_bytes([7; 16]),
            policy_version: "1".to_string(),
            timestamp: Timestamp::from_millis(1_700_000_000_000),
            tool: "read_records".to_string(),
            connectors: vec!["csv-users".to_string()],
            decision: PolicyAction::Allow,
            reason: String::new(),
            matched_rule: None,
            subject: Some("agent-1".to_string()),
            tenant: None,
            break_glass: false,
            write_approved_by: None,
            request: RequestSummary::default(),
        }
    }

    #[test]
    fn sealing_chains_from_genesis() {
        let first = DecisionRecord::seal(core("d-1"), GENESIS_PREV_HASH).unwrap();
        assert_eq!(first.prev_hash, GENESIS_PREV_HASH);
        assert!(first.verify().unwrap());

        let second = DecisionRecord::seal(core("d-2"), &first.hash).unwrap();
        assert_eq!(second.prev_hash, first.hash);
        assert!(second.verify().unwrap());
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut record = DecisionRecord::seal(core("d-1"), GENESIS_PREV_HASH).unwrap();
        record.core.tool = "write_records".to_string();
        assert!(!record.verify().unwrap());
    }
}
