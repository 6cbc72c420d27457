// crates/datatrust-core/src/lib.rs
// ============================================================================
// Module: DataTrust Core
// Description: Data model, connector contract, policy engine, hash primitives.
// Purpose: Provide the dependency-light heart shared by every other crate.
// Dependencies: async-trait, regex, serde, serde_json, sha2, subtle, thiserror, time
// ============================================================================

//! ## Overview
//! This crate defines the canonical data model (records, schemas, filters),
//! the uniform connector contract, the typed error model, the pure policy
//! engine, field masking, and the hash-chain primitives used by the policy
//! audit trail. It performs no I/O; connectors, governance, trust
//! primitives, and the server build on these types.
//!
//! Security posture: all record and filter contents are untrusted input;
//! forbidden keys are rejected at ingestion and masking is applied at the
//! emission boundary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connector;
pub mod error;
pub mod filter;
pub mod hashing;
pub mod identifiers;
pub mod masking;
pub mod policy;
pub mod record;
pub mod schema;
pub mod time;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use connector::ConnectionState;
pub use connector::Connector;
pub use connector::ConnectorInfo;
pub use connector::ConnectorOp;
pub use connector::ReadResult;
pub use connector::RecordValidation;
pub use connector::ValidationReport;
pub use connector::WriteErrorDetail;
pub use connector::WriteMode;
pub use connector::WriteResult;
pub use error::ConnectorError;
pub use error::ConnectorErrorKind;
pub use error::TrustError;
pub use error::TrustErrorKind;
pub use filter::FilterCondition;
pub use filter::FilterOperator;
pub use filter::FilterOptions;
pub use filter::OrderBy;
pub use filter::Pagination;
pub use filter::SortDirection;
pub use identifiers::DecisionId;
pub use identifiers::TraceId;
pub use identifiers::sanitize_path_component;
pub use masking::MaskSet;
pub use policy::Policy;
pub use policy::PolicyAction;
pub use policy::PolicyOverlay;
pub use policy::PolicyRule;
pub use policy::decision::DecisionCore;
pub use policy::decision::DecisionRecord;
pub use policy::engine::ApprovedBy;
pub use policy::engine::CompiledPolicy;
pub use policy::engine::Evaluation;
pub use policy::engine::Identity;
pub use policy::engine::PolicyRequest;
pub use policy::engine::RequestSummary;
pub use policy::engine::Verdict;
pub use record::ForbiddenKeyError;
pub use record::Record;
pub use schema::FieldDefinition;
pub use schema::FieldType;
pub use schema::Schema;
pub use schema::SchemaOrigin;
pub use time::Timestamp;
