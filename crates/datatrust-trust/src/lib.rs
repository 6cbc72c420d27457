// crates/datatrust-trust/src/lib.rs
// ============================================================================
// Module: DataTrust Trust Primitives
// Description: Consistency, change detection, reconciliation, audit, snapshots.
// Purpose: Provide verifiable answers about data spread across connectors.
// Dependencies: datatrust-core, regex, serde, serde_json, strsim, time, tokio
// ============================================================================

//! ## Overview
//! Trust primitives consume the connector contract and emit structured
//! reports: the consistency monitor compares two sources under a field
//! mapping, the change detector diffs a connector against time or a
//! snapshot, and the reconciliation engine pairs records under weighted
//! rules. The snapshot store and the operation audit trail are the
//! persistent artifacts these primitives anchor to.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod changes;
pub mod consistency;
pub mod loader;
pub mod reconcile;
pub mod snapshot;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use audit::AuditEntry;
pub use audit::AuditLogger;
pub use audit::AuditOperation;
pub use audit::AuditQuery;
pub use audit::AuditQueryResult;
pub use changes::ChangeDetectionMode;
pub use changes::ChangeDetectionOptions;
pub use changes::ChangeReport;
pub use changes::detect_changes;
pub use consistency::CompareOptions;
pub use consistency::ComparatorRegistry;
pub use consistency::ComparisonReport;
pub use consistency::FieldMapping;
pub use consistency::Transform;
pub use consistency::compare_connectors;
pub use loader::ABSOLUTE_MAX_RECORDS;
pub use loader::DEFAULT_MAX_RECORDS;
pub use reconcile::MatchPair;
pub use reconcile::ReconcileOptions;
pub use reconcile::ReconcileReport;
pub use reconcile::ReconcileRule;
pub use reconcile::RuleOperator;
pub use reconcile::reconcile_connectors;
pub use reconcile::reconcile_records;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotMeta;
pub use snapshot::SnapshotStore;
