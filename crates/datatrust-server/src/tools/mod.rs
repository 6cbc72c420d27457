// crates/datatrust-server/src/tools/mod.rs
// ============================================================================
// Module: Tool Surface
// Description: Stable tool names, typed arguments, and descriptors.
// Purpose: Decode every tool call into a strongly typed request.
// Dependencies: datatrust-core, datatrust-trust, serde
// ============================================================================

//! ## Overview
//! The server exposes twelve tools with stable names. Arguments decode with
//! `deny_unknown_fields` so misspelled keys fail loudly; the parsed enum
//! also derives the connector set and the policy request summary the
//! engine consumes. Tool descriptors back `tools/list`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod handlers;

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::FilterCondition;
use datatrust_core::FilterOptions;
use datatrust_core::OrderBy;
use datatrust_core::Pagination;
use datatrust_core::Record;
use datatrust_core::RequestSummary;
use datatrust_core::WriteMode;
use datatrust_trust::AuditOperation;
use datatrust_trust::ReconcileRule;
use datatrust_trust::consistency::FieldMapping;
use datatrust_trust::reconcile::blocking::BlockingConfig;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// Stable tool names in listing order.
pub const TOOL_NAMES: &[&str] = &[
    "list_connectors",
    "get_schema",
    "read_records",
    "write_records",
    "validate_records",
    "compare_records",
    "detect_changes",
    "create_snapshot",
    "list_snapshots",
    "delete_snapshot",
    "query_audit_log",
    "reconcile_records",
];

// ============================================================================
// SECTION: Argument Types
// ============================================================================

/// Output format for report-producing tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Structured JSON payload.
    #[default]
    Json,
    /// Preformatted text report.
    Text,
}

/// Arguments for `get_schema`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetSchemaArgs {
    /// Target connector.
    pub connector_id: String,
    /// Bypass cached schemas.
    #[serde(default)]
    pub force_refresh: bool,
}

/// Arguments for `read_records`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadRecordsArgs {
    /// Target connector.
    pub connector_id: String,
    /// Filter conditions.
    #[serde(default, rename = "where")]
    pub conditions: Vec<FilterCondition>,
    /// Projection list.
    #[serde(default)]
    pub select: Vec<String>,
    /// Ordering entries.
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    /// Offset pagination start.
    #[serde(default)]
    pub offset: Option<u64>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Cursor pagination token.
    #[serde(default)]
    pub cursor: Option<String>,
}

impl ReadRecordsArgs {
    /// Builds filter options, enforcing pagination exclusivity.
    ///
    /// # Errors
    ///
    /// Returns a message when both offset and cursor are supplied.
    pub fn filter(&self) -> Result<FilterOptions, String> {
        let pagination = match (&self.cursor, self.offset, self.limit) {
            (Some(_), Some(_), _) => {
                return Err("offset and cursor pagination are mutually exclusive".to_string());
            }
            (Some(cursor), None, limit) => Some(Pagination::Cursor {
                cursor: cursor.clone(),
                limit: limit.unwrap_or(1_000),
            }),
            (None, Some(offset), limit) => Some(Pagination::Offset {
                offset,
                limit: limit.unwrap_or(1_000),
            }),
            (None, None, Some(limit)) => Some(Pagination::Offset {
                offset: 0,
                limit,
            }),
            (None, None, None) => None,
        };
        Ok(FilterOptions {
            conditions: self.conditions.clone(),
            select: self.select.clone(),
            order_by: self.order_by.clone(),
            pagination,
        })
    }
}

/// Arguments for `write_records`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteRecordsArgs {
    /// Target connector.
    pub connector_id: String,
    /// Records to write.
    pub records: Vec<Record>,
    /// Write mode.
    #[serde(default = "default_write_mode")]
    pub mode: WriteMode,
    /// Caller-supplied approval token.
    #[serde(default)]
    pub approval_token: Option<String>,
    /// Acting user recorded in the operation audit trail.
    #[serde(default)]
    pub user: Option<String>,
}

/// Returns the default write mode.
const fn default_write_mode() -> WriteMode {
    WriteMode::Insert
}

/// Arguments for `validate_records`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateRecordsArgs {
    /// Target connector.
    pub connector_id: String,
    /// Records to validate.
    pub records: Vec<Record>,
}

/// Arguments for `compare_records`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareRecordsArgs {
    /// Source connector.
    pub source_id: String,
    /// Target connector.
    pub target_id: String,
    /// Field mappings.
    pub mappings: Vec<FieldMapping>,
    /// Source-side key fields.
    pub source_key: Vec<String>,
    /// Target-side key fields.
    pub target_key: Vec<String>,
    /// Record bound.
    #[serde(default)]
    pub max_records: Option<u64>,
    /// Output format.
    #[serde(default)]
    pub format: ReportFormat,
}

/// Arguments for `detect_changes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectChangesArgs {
    /// Target connector.
    pub connector_id: String,
    /// Snapshot to diff against (snapshot mode).
    #[serde(default)]
    pub snapshot_id: Option<String>,
    /// Timestamp field (timestamp mode).
    #[serde(default)]
    pub timestamp_field: Option<String>,
    /// Exclusive lower bound (timestamp mode).
    #[serde(default)]
    pub since: Option<Value>,
    /// Key field for diffing.
    pub key_field: String,
    /// Restrict modification checks to these fields.
    #[serde(default)]
    pub track_fields: Vec<String>,
    /// Record bound.
    #[serde(default)]
    pub max_records: Option<u64>,
    /// Output format.
    #[serde(default)]
    pub format: ReportFormat,
}

/// Arguments for `create_snapshot`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSnapshotArgs {
    /// Source connector.
    pub connector_id: String,
    /// Fresh snapshot identifier.
    pub snapshot_id: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Record bound.
    #[serde(default)]
    pub max_records: Option<u64>,
}

/// Arguments for `list_snapshots`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListSnapshotsArgs {
    /// Restrict the listing to one connector.
    #[serde(default)]
    pub connector_id: Option<String>,
}

/// Arguments for `delete_snapshot`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteSnapshotArgs {
    /// Snapshot identifier.
    pub snapshot_id: String,
}

/// Arguments for `query_audit_log`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryAuditLogArgs {
    /// Connector whose trail is queried.
    pub connector_id: String,
    /// Operation subset.
    #[serde(default)]
    pub operations: Vec<AuditOperation>,
    /// Exact record key filter.
    #[serde(default)]
    pub record_key: Option<String>,
    /// Exact user filter.
    #[serde(default)]
    pub user: Option<String>,
    /// Inclusive lower bound (RFC3339).
    #[serde(default)]
    pub from: Option<String>,
    /// Inclusive upper bound (RFC3339).
    #[serde(default)]
    pub to: Option<String>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Page offset.
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Arguments for `reconcile_records`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileRecordsArgs {
    /// Source connector.
    pub source_id: String,
    /// Target connector.
    pub target_id: String,
    /// Rule list.
    pub rules: Vec<ReconcileRule>,
    /// Admissibility threshold on the 0–100 scale.
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Blocking configuration.
    #[serde(default)]
    pub blocking: Option<BlockingConfig>,
    /// Record bound.
    #[serde(default)]
    pub max_records: Option<u64>,
    /// Output format.
    #[serde(default)]
    pub format: ReportFormat,
}

// ============================================================================
// SECTION: Parsed Calls
// ============================================================================

/// Parsed tool call.
#[derive(Debug, Clone)]
pub enum ToolArgs {
    /// `list_connectors`.
    ListConnectors,
    /// `get_schema`.
    GetSchema(GetSchemaArgs),
    /// `read_records`.
    ReadRecords(ReadRecordsArgs),
    /// `write_records`.
    WriteRecords(WriteRecordsArgs),
    /// `validate_records`.
    ValidateRecords(ValidateRecordsArgs),
    /// `compare_records`.
    CompareRecords(CompareRecordsArgs),
    /// `detect_changes`.
    DetectChanges(DetectChangesArgs),
    /// `create_snapshot`.
    CreateSnapshot(CreateSnapshotArgs),
    /// `list_snapshots`.
    ListSnapshots(ListSnapshotsArgs),
    /// `delete_snapshot`.
    DeleteSnapshot(DeleteSnapshotArgs),
    /// `query_audit_log`.
    QueryAuditLog(QueryAuditLogArgs),
    /// `reconcile_records`.
    ReconcileRecords(ReconcileRecordsArgs),
}

impl ToolArgs {
    /// Parses arguments for a named tool.
    ///
    /// # Errors
    ///
    /// Returns a message for unknown tools or malformed arguments.
    pub fn parse(tool: &str, arguments: Value) -> Result<Self, String> {
        let decode_error = |err: serde_json::Error| format!("invalid arguments: {err}");
        match tool {
            "list_connectors" => {
                let _: ListConnectorsArgs =
                    serde_json::from_value(arguments).map_err(decode_error)?;
                Ok(Self::ListConnectors)
            }
            "get_schema" => {
                Ok(Self::GetSchema(serde_json::from_value(arguments).map_err(decode_error)?))
            }
            "read_records" => {
                Ok(Self::ReadRecords(serde_json::from_value(arguments).map_err(decode_error)?))
            }
            "write_records" => {
                Ok(Self::WriteRecords(serde_json::from_value(arguments).map_err(decode_error)?))
            }
            "validate_records" => Ok(Self::ValidateRecords(
                serde_json::from_value(arguments).map_err(decode_error)?,
            )),
            "compare_records" => Ok(Self::CompareRecords(
                serde_json::from_value(arguments).map_err(decode_error)?,
            )),
            "detect_changes" => {
                Ok(Self::DetectChanges(serde_json::from_value(arguments).map_err(decode_error)?))
            }
            "create_snapshot" => Ok(Self::CreateSnapshot(
                serde_json::from_value(arguments).map_err(decode_error)?,
            )),
            "list_snapshots" => {
                Ok(Self::ListSnapshots(serde_json::from_value(arguments).map_err(decode_error)?))
            }
            "delete_snapshot" => Ok(Self::DeleteSnapshot(
                serde_json::from_value(arguments).map_err(decode_error)?,
            )),
            "query_audit_log" => {
                Ok(Self::QueryAuditLog(serde_json::from_value(arguments).map_err(decode_error)?))
            }
            "reconcile_records" => Ok(Self::ReconcileRecords(
                serde_json::from_value(arguments).map_err(decode_error)?,
            )),
            other => Err(format!("unknown tool `{other}`")),
        }
    }

    /// Returns the connector ids touched by the call.
    #[must_use]
    pub fn connectors(&self) -> Vec<String> {
        match self {
            Self::ListConnectors
            | Self::ListSnapshots(_)
            | Self::DeleteSnapshot(_) => Vec::new(),
            Self::GetSchema(args) => vec![args.connector_id.clone()],
            Self::ReadRecords(args) => vec![args.connector_id.clone()],
            Self::WriteRecords(args) => vec![args.connector_id.clone()],
            Self::ValidateRecords(args) => vec![args.connector_id.clone()],
            Self::CompareRecords(args) => vec![args.source_id.clone(), args.target_id.clone()],
            Self::DetectChanges(args) => vec![args.connector_id.clone()],
            Self::CreateSnapshot(args) => vec![args.connector_id.clone()],
            Self::QueryAuditLog(args) => vec![args.connector_id.clone()],
            Self::ReconcileRecords(args) => vec![args.source_id.clone(), args.target_id.clone()],
        }
    }

    /// Builds the policy request summary for the call.
    #[must_use]
    pub fn summary(&self) -> RequestSummary {
        match self {
            Self::ReadRecords(args) => RequestSummary {
                select_fields: args.select.clone(),
                where_fields: args
                    .conditions
                    .iter()
                    .map(|condition| condition.field.clone())
                    .collect(),
                ..RequestSummary::default()
            },
            Self::WriteRecords(args) => RequestSummary {
                write_mode: Some(args.mode),
                record_fields: record_fields(&args.records),
                record_count: args.records.len() as u64,
                ..RequestSummary::default()
            },
            Self::ValidateRecords(args) => RequestSummary {
                record_fields: record_fields(&args.records),
                record_count: args.records.len() as u64,
                ..RequestSummary::default()
            },
            _ => RequestSummary::default(),
        }
    }

    /// Returns the caller-supplied approval token, when present.
    #[must_use]
    pub fn approval_token(&self) -> Option<&str> {
        match self {
            Self::WriteRecords(args) => args.approval_token.as_deref(),
            _ => None,
        }
    }
}

/// Empty argument object for `list_connectors`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListConnectorsArgs {}

/// Collects the distinct field names across a record batch.
fn record_fields(records: &[Record]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for record in records {
        for field in record.field_names() {
            if !fields.iter().any(|existing| existing == field) {
                fields.push(field.to_string());
            }
        }
    }
    fields
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Tool descriptor for `tools/list`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    /// Stable tool name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// JSON schema of the arguments.
    pub input_schema: Value,
}

/// Returns descriptors for every tool in listing order.
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    let connector_arg = json!({"type": "string", "description": "Connector id"});
    vec![
        ToolDescriptor {
            name: "list_connectors".to_string(),
            description: "List registered connectors with their state".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDescriptor {
            name: "get_schema".to_string(),
            description: "Return a connector's declared or inferred schema".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id"],
                "properties": {
                    "connector_id": connector_arg,
                    "force_refresh": {"type": "boolean"},
                },
            }),
        },
        ToolDescriptor {
            name: "read_records".to_string(),
            description: "Read records with filtering, ordering, and pagination".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id"],
                "properties": {
                    "connector_id": connector_arg,
                    "where": {"type": "array", "items": {"type": "object"}},
                    "select": {"type": "array", "items": {"type": "string"}},
                    "order_by": {"type": "array", "items": {"type": "object"}},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "cursor": {"type": "string"},
                },
            }),
        },
        ToolDescriptor {
            name: "write_records".to_string(),
            description: "Write records in insert, update, or upsert mode".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id", "records"],
                "properties": {
                    "connector_id": connector_arg,
                    "records": {"type": "array", "items": {"type": "object"}},
                    "mode": {"type": "string", "enum": ["insert", "update", "upsert"]},
                    "approval_token": {"type": "string"},
                    "user": {"type": "string"},
                },
            }),
        },
        ToolDescriptor {
            name: "validate_records".to_string(),
            description: "Validate records against a connector's schema".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id", "records"],
                "properties": {
                    "connector_id": connector_arg,
                    "records": {"type": "array", "items": {"type": "object"}},
                },
            }),
        },
        ToolDescriptor {
            name: "compare_records".to_string(),
            description: "Compare two connectors under a field mapping".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["source_id", "target_id", "mappings", "source_key", "target_key"],
                "properties": {
                    "source_id": connector_arg,
                    "target_id": connector_arg,
                    "mappings": {"type": "array", "items": {"type": "object"}},
                    "source_key": {"type": "array", "items": {"type": "string"}},
                    "target_key": {"type": "array", "items": {"type": "string"}},
                    "max_records": {"type": "integer"},
                    "format": {"type": "string", "enum": ["json", "text"]},
                },
            }),
        },
        ToolDescriptor {
            name: "detect_changes".to_string(),
            description: "Detect changes against a snapshot or a timestamp".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id", "key_field"],
                "properties": {
                    "connector_id": connector_arg,
                    "snapshot_id": {"type": "string"},
                    "timestamp_field": {"type": "string"},
                    "since": {},
                    "key_field": {"type": "string"},
                    "track_fields": {"type": "array", "items": {"type": "string"}},
                    "max_records": {"type": "integer"},
                    "format": {"type": "string", "enum": ["json", "text"]},
                },
            }),
        },
        ToolDescriptor {
            name: "create_snapshot".to_string(),
            description: "Capture an immutable snapshot of a connector".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id", "snapshot_id"],
                "properties": {
                    "connector_id": connector_arg,
                    "snapshot_id": {"type": "string"},
                    "description": {"type": "string"},
                    "max_records": {"type": "integer"},
                },
            }),
        },
        ToolDescriptor {
            name: "list_snapshots".to_string(),
            description: "List stored snapshots".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"connector_id": connector_arg},
            }),
        },
        ToolDescriptor {
            name: "delete_snapshot".to_string(),
            description: "Delete a stored snapshot".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["snapshot_id"],
                "properties": {"snapshot_id": {"type": "string"}},
            }),
        },
        ToolDescriptor {
            name: "query_audit_log".to_string(),
            description: "Query the operation audit trail".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["connector_id"],
                "properties": {
                    "connector_id": connector_arg,
                    "operations": {"type": "array", "items": {"type": "string"}},
                    "record_key": {"type": "string"},
                    "user": {"type": "string"},
                    "from": {"type": "string"},
                    "to": {"type": "string"},
                    "limit": {"type": "integer"},
                    "offset": {"type": "integer"},
                },
            }),
        },
        ToolDescriptor {
            name: "reconcile_records".to_string(),
            description: "Pair records across two connectors under weighted rules".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["source_id", "target_id", "rules"],
                "properties": {
                    "source_id": connector_arg,
                    "target_id": connector_arg,
                    "rules": {"type": "array", "items": {"type": "object"}},
                    "min_confidence": {"type": "number"},
                    "blocking": {"type": "object"},
                    "max_records": {"type": "integer"},
                    "format": {"type": "string", "enum": ["json", "text"]},
                },
            }),
        },
    ]
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::TOOL_NAMES;
    use super::ToolArgs;
    use super::descriptors;

    #[test]
    fn descriptors_cover_every_tool_in_order() {
        let names: Vec<String> =
            descriptors().into_iter().map(|descriptor| descriptor.name).collect();
        assert_eq!(names, TOOL_NAMES);
    }

    #[test]
    fn unknown_fields_fail_decoding() {
        let err = ToolArgs::parse("read_records", json!({"connector_id": "c", "nope": 1}))
            .unwrap_err();
        assert!(err.contains("invalid arguments"));
    }

    #[test]
    fn summary_reflects_read_and_write_shapes() {
        let read = ToolArgs::parse(
            "read_records",
            json!({
                "connector_id": "c",
                "where": [{"field": "id", "op": "eq", "value": 1}],
                "select": ["email"],
            }),
        )
        .unwrap();
        let summary = read.summary();
        assert_eq!(summary.where_fields, vec!["id"]);
        assert_eq!(summary.select_fields, vec!["email"]);

        let write = ToolArgs::parse(
            "write_records",
            json!({
                "connector_id": "c",
                "records": [{"name": "Z", "email": "z@x"}],
                "mode": "upsert",
                "approval_token": "tok",
            }),
        )
        .unwrap();
        let summary = write.summary();
        assert_eq!(summary.record_count, 1);
        assert!(summary.record_fields.contains(&"email".to_string()));
        assert_eq!(write.approval_token(), Some("tok"));
    }

    #[test]
    fn offset_and_cursor_are_mutually_exclusive() {
        let args = ToolArgs::parse(
            "read_records",
            json!({"connector_id": "c", "offset": 1, "cursor": "abc", "limit": 5}),
        )
        .unwrap();
        let ToolArgs::ReadRecords(read) = args else {
            panic!("expected read_records args");
        };
        assert!(read.filter().is_err());
    }
}
