// crates/datatrust-core/src/error.rs
// ============================================================================
// Module: DataTrust Error Model
// Description: Typed error kinds for connector and trust operations.
// Purpose: Provide stable, actionable error values for every external failure.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every externally visible failure carries a stable kind tag, a human
//! message, and an actionable suggestion. Connector errors cover the adapter
//! capability surface; trust errors cover the consistency, change-detection,
//! reconciliation, snapshot, and audit subsystems. Kinds are serialized in
//! SCREAMING_SNAKE_CASE to keep wire labels stable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Connector Error Kinds
// ============================================================================

/// Stable kind tags for connector operation failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling and audit labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorErrorKind {
    /// Connection to the backing source failed.
    ConnectionFailed,
    /// Credentials were rejected by the backing source.
    AuthenticationFailed,
    /// A referenced entity does not exist.
    NotFound,
    /// Record contents failed validation.
    ValidationError,
    /// The backing source denied the operation.
    PermissionDenied,
    /// The backing source throttled the operation.
    RateLimited,
    /// The operation exceeded its deadline.
    Timeout,
    /// Records do not match the declared or inferred schema.
    SchemaMismatch,
    /// A write operation failed.
    WriteFailed,
    /// A read operation failed.
    ReadFailed,
    /// The connector does not support the requested operation.
    UnsupportedOperation,
    /// The connector configuration is invalid.
    ConfigurationError,
    /// An unclassified failure.
    Unknown,
}

impl ConnectorErrorKind {
    /// Returns the stable wire label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::WriteFailed => "WRITE_FAILED",
            Self::ReadFailed => "READ_FAILED",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Connector Error
// ============================================================================

/// Typed connector operation failure.
///
/// # Invariants
/// - `message` is human-readable and never empty.
/// - `suggestion` names a concrete next step when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub struct ConnectorError {
    /// Stable kind tag.
    pub kind: ConnectorErrorKind,
    /// Human-readable failure description.
    pub message: String,
    /// Connector identifier when the failure is connector-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,
    /// Actionable remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Supplementary structured context (transport codes, limits, snapshots).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub context: BTreeMap<String, Value>,
}

impl ConnectorError {
    /// Creates a connector error with a kind and message.
    #[must_use]
    pub fn new(kind: ConnectorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            connector_id: None,
            suggestion: None,
            context: BTreeMap::new(),
        }
    }

    /// Attaches the connector identifier.
    #[must_use]
    pub fn with_connector(mut self, connector_id: impl Into<String>) -> Self {
        self.connector_id = Some(connector_id.into());
        self
    }

    /// Attaches an actionable suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attaches a structured context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Returns the transport-layer code recorded in context when present.
    #[must_use]
    pub fn transport_code(&self) -> Option<&str> {
        self.context.get("transport_code").and_then(Value::as_str)
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Trust Error Kinds
// ============================================================================

/// Stable kind tags for trust-primitive failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling and audit labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustErrorKind {
    /// Comparison source connector is not connected.
    SourceNotConnected,
    /// Comparison target connector is not connected.
    TargetNotConnected,
    /// The referenced connector is not connected.
    ConnectorNotConnected,
    /// A snapshot references a different connector than the one supplied.
    ConnectorMismatch,
    /// Field mapping configuration is invalid.
    MappingError,
    /// A required key field is missing from a record.
    KeyFieldMissing,
    /// A comparison run failed.
    ComparisonFailed,
    /// A batch of records failed mid-processing.
    BatchProcessingError,
    /// Supplied options are invalid.
    InvalidOptions,
    /// Snapshot storage failed.
    SnapshotError,
    /// A snapshot with the requested identifier already exists.
    SnapshotExists,
    /// The requested snapshot does not exist.
    SnapshotNotFound,
    /// Operation audit logging failed.
    AuditLogError,
    /// Operation audit querying failed.
    AuditQueryError,
    /// A reconciliation run failed.
    ReconciliationError,
    /// A reconciliation rule is invalid.
    InvalidRule,
}

impl TrustErrorKind {
    /// Returns the stable wire label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourceNotConnected => "SOURCE_NOT_CONNECTED",
            Self::TargetNotConnected => "TARGET_NOT_CONNECTED",
            Self::ConnectorNotConnected => "CONNECTOR_NOT_CONNECTED",
            Self::ConnectorMismatch => "CONNECTOR_MISMATCH",
            Self::MappingError => "MAPPING_ERROR",
            Self::KeyFieldMissing => "KEY_FIELD_MISSING",
            Self::ComparisonFailed => "COMPARISON_FAILED",
            Self::BatchProcessingError => "BATCH_PROCESSING_ERROR",
            Self::InvalidOptions => "INVALID_OPTIONS",
            Self::SnapshotError => "SNAPSHOT_ERROR",
            Self::SnapshotExists => "SNAPSHOT_EXISTS",
            Self::SnapshotNotFound => "SNAPSHOT_NOT_FOUND",
            Self::AuditLogError => "AUDIT_LOG_ERROR",
            Self::AuditQueryError => "AUDIT_QUERY_ERROR",
            Self::ReconciliationError => "RECONCILIATION_ERROR",
            Self::InvalidRule => "INVALID_RULE",
        }
    }
}

impl fmt::Display for TrustErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Trust Error
// ============================================================================

/// Typed trust-primitive failure.
///
/// # Invariants
/// - `message` is human-readable and never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub struct TrustError {
    /// Stable kind tag.
    pub kind: TrustErrorKind,
    /// Human-readable failure description.
    pub message: String,
    /// Actionable remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Connector error that caused this failure, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ConnectorError>,
}

impl TrustError {
    /// Creates a trust error with a kind and message.
    #[must_use]
    pub fn new(kind: TrustErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
            cause: None,
        }
    }

    /// Attaches an actionable suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attaches the connector error that caused this failure.
    #[must_use]
    pub fn with_cause(mut self, cause: ConnectorError) -> Self {
        self.cause = Some(cause);
        self
    }
}

impl fmt::Display for TrustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl From<ConnectorError> for TrustError {
    fn from(cause: ConnectorError) -> Self {
        Self::new(TrustErrorKind::ComparisonFailed, cause.message.clone()).with_cause(cause)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::ConnectorError;
    use super::ConnectorErrorKind;
    use super::TrustErrorKind;

    #[test]
    fn kind_labels_are_screaming_snake() {
        assert_eq!(ConnectorErrorKind::UnsupportedOperation.as_str(), "UNSUPPORTED_OPERATION");
        assert_eq!(TrustErrorKind::SnapshotExists.as_str(), "SNAPSHOT_EXISTS");
        let encoded = serde_json::to_value(ConnectorErrorKind::ReadFailed).unwrap();
        assert_eq!(encoded, json!("READ_FAILED"));
    }

    #[test]
    fn display_includes_kind_and_suggestion() {
        let err = ConnectorError::new(ConnectorErrorKind::Timeout, "read timed out")
            .with_suggestion("increase timeout_ms");
        let rendered = err.to_string();
        assert!(rendered.contains("TIMEOUT"));
        assert!(rendered.contains("increase timeout_ms"));
    }

    #[test]
    fn transport_code_round_trips_through_context() {
        let err = ConnectorError::new(ConnectorErrorKind::ConnectionFailed, "reset")
            .with_context("transport_code", json!("ECONNRESET"));
        assert_eq!(err.transport_code(), Some("ECONNRESET"));
    }
}
