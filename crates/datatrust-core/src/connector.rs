// crates/datatrust-core/src/connector.rs
// ============================================================================
// Module: DataTrust Connector Contract
// Description: Uniform capability surface every data-source adapter implements.
// Purpose: Define the async trait and result shapes the core consumes.
// Dependencies: async-trait, serde, crate::{error, filter, record, schema}
// ============================================================================

//! ## Overview
//! Every adapter (file, SQL, SaaS, in-memory) implements [`Connector`].
//! The governance layer wraps this trait uniformly; handlers never talk to
//! a raw adapter. Operations fail with [`ConnectorError`] carrying a stable
//! kind, a message, and an actionable suggestion.
//!
//! ## Invariants
//! - Read-only connectors reject `write_records` with `UNSUPPORTED_OPERATION`.
//! - `read_records` honours filter, projection, ordering, and pagination.
//! - `write_records` reports per-index failures without aborting the batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConnectorError;
use crate::filter::FilterOptions;
use crate::record::Record;
use crate::schema::Schema;

// ============================================================================
// SECTION: Connector Identity
// ============================================================================

/// Connection lifecycle state.
///
/// # Invariants
/// - Variants are stable for serialization and admin reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and usable.
    Connected,
    /// Connection failed; see connector health for details.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Connector identity surfaced to tools and the admin endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    /// Unique connector identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Type tag (`csv`, `json`, `postgresql`, ...).
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Whether writes are rejected.
    pub readonly: bool,
}

// ============================================================================
// SECTION: Operation Results
// ============================================================================

/// Result of a paged read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    /// Records in this page.
    pub records: Vec<Record>,
    /// Total matching records when the source can count cheaply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Whether more records are available.
    pub has_more: bool,
    /// Continuation cursor when more records are available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Write mode for `write_records`.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Insert new records.
    Insert,
    /// Update existing records.
    Update,
    /// Insert or update by key.
    Upsert,
}

impl WriteMode {
    /// Returns a stable label for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
        }
    }
}

/// Per-record write failure detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteErrorDetail {
    /// Index of the failing record in the submitted batch.
    pub index: usize,
    /// Failure description.
    pub message: String,
}

/// Result of a batched write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Number of records written.
    pub success: u64,
    /// Number of records that failed.
    pub failed: u64,
    /// Per-index failure details.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<WriteErrorDetail>,
    /// Identifiers assigned to written records when the source reports them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

/// Validation outcome for a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordValidation {
    /// Index of the record in the submitted batch.
    pub index: usize,
    /// Whether the record is valid.
    pub valid: bool,
    /// Violation messages when invalid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Validation outcome for a batch of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether every record is valid.
    pub valid: bool,
    /// Per-record outcomes.
    pub records: Vec<RecordValidation>,
}

impl ValidationReport {
    /// Builds a report from per-record outcomes.
    #[must_use]
    pub fn from_records(records: Vec<RecordValidation>) -> Self {
        let valid = records.iter().all(|record| record.valid);
        Self {
            valid,
            records,
        }
    }
}

// ============================================================================
// SECTION: Connector Trait
// ============================================================================

/// Uniform capability surface for data-source adapters.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector identity.
    fn info(&self) -> ConnectorInfo;

    /// Returns the current connection state.
    fn state(&self) -> ConnectionState;

    /// Establishes the connection.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the source is unreachable or rejects
    /// the configured credentials.
    async fn connect(&self) -> Result<(), ConnectorError>;

    /// Tears down the connection.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when teardown fails.
    async fn disconnect(&self) -> Result<(), ConnectorError>;

    /// Returns the schema, bypassing caches when `force_refresh` is set.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the schema cannot be obtained.
    async fn get_schema(&self, force_refresh: bool) -> Result<Schema, ConnectorError>;

    /// Reads records matching the filter.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the read fails or the filter is
    /// invalid for this source.
    async fn read_records(&self, filter: &FilterOptions) -> Result<ReadResult, ConnectorError>;

    /// Writes records in the given mode.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the write fails wholesale; per-record
    /// failures are reported in the [`WriteResult`].
    async fn write_records(
        &self,
        records: &[Record],
        mode: WriteMode,
    ) -> Result<WriteResult, ConnectorError>;

    /// Validates records against the schema without writing.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when validation cannot run.
    async fn validate_records(&self, records: &[Record]) -> Result<ValidationReport, ConnectorError>;

    /// Probes connectivity.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the probe fails.
    async fn test_connection(&self) -> Result<(), ConnectorError>;
}

/// Connector operation names used for retry classification and metrics.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorOp {
    /// `connect` operation.
    Connect,
    /// `disconnect` operation.
    Disconnect,
    /// `get_schema` operation.
    GetSchema,
    /// `read_records` operation.
    ReadRecords,
    /// `write_records` operation.
    WriteRecords,
    /// `validate_records` operation.
    ValidateRecords,
    /// `test_connection` operation.
    TestConnection,
}

impl ConnectorOp {
    /// Returns a stable label for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::GetSchema => "get_schema",
            Self::ReadRecords => "read_records",
            Self::WriteRecords => "write_records",
            Self::ValidateRecords => "validate_records",
            Self::TestConnection => "test_connection",
        }
    }

    /// Returns true when the operation is safe to retry.
    #[must_use]
    pub const fn idempotent(self) -> bool {
        matches!(
            self,
            Self::Connect
                | Self::TestConnection
                | Self::GetSchema
                | Self::ReadRecords
                | Self::ValidateRecords
        )
    }
}

impl fmt::Display for ConnectorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
