// crates/datatrust-server/src/tools/handlers.rs
// ============================================================================
// Module: Tool Handlers
// Description: Implementations of the twelve tool operations.
// Purpose: Bridge parsed tool calls onto connectors and trust primitives.
// Dependencies: datatrust-connectors, datatrust-core, datatrust-trust
// ============================================================================

//! ## Overview
//! Handlers consume the registry and trust primitives and return structured
//! payloads. `write_records` enforces the write gate sequence: for
//! schema-backed connector types the schema field set is checked first,
//! then `validate_records` must pass for every record, then the write runs
//! and each written record lands in the operation audit trail. A failed
//! audit append fails the call to preserve the no-modification-without-
//! audit invariant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use datatrust_connectors::ConnectorRegistry;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_core::TrustError;
use datatrust_core::WriteMode;
use datatrust_trust::AuditEntry;
use datatrust_trust::AuditLogger;
use datatrust_trust::AuditOperation;
use datatrust_trust::AuditQuery;
use datatrust_trust::ChangeDetectionMode;
use datatrust_trust::ChangeDetectionOptions;
use datatrust_trust::CompareOptions;
use datatrust_trust::ComparatorRegistry;
use datatrust_trust::ReconcileOptions;
use datatrust_trust::Snapshot;
use datatrust_trust::SnapshotMeta;
use datatrust_trust::SnapshotStore;
use datatrust_trust::compare_connectors;
use datatrust_trust::detect_changes;
use datatrust_trust::loader::clamp_max_records;
use datatrust_trust::loader::load_records;
use datatrust_trust::loader::require_connected;
use datatrust_trust::reconcile_connectors;
use serde_json::Value;
use serde_json::json;

use crate::context::TelemetryContext;
use crate::report::render_changes;
use crate::report::render_comparison;
use crate::report::render_reconcile;
use crate::tools::ReportFormat;
use crate::tools::ToolArgs;
use crate::tools::WriteRecordsArgs;

// ============================================================================
// SECTION: Errors and Outputs
// ============================================================================

/// Connector types whose schemas are authoritative for writes.
pub const SCHEMA_BACKED_TYPES: &[&str] = &["postgresql", "mysql", "odoo", "hubspot"];

/// Tool-level failure surfaced to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct ToolError {
    /// Stable kind tag.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// Actionable remediation hint.
    pub suggestion: Option<String>,
}

impl ToolError {
    /// Creates a tool error.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            suggestion: None,
        }
    }
}

impl From<ConnectorError> for ToolError {
    fn from(err: ConnectorError) -> Self {
        Self {
            kind: err.kind.as_str().to_string(),
            message: err.message,
            suggestion: err.suggestion,
        }
    }
}

impl From<TrustError> for ToolError {
    fn from(err: TrustError) -> Self {
        Self {
            kind: err.kind.as_str().to_string(),
            message: err.message,
            suggestion: err.suggestion,
        }
    }
}

/// Handler output: a structured payload, optionally rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Structured JSON payload.
    pub payload: Value,
    /// Preformatted text report when the caller asked for one.
    pub text: Option<String>,
}

impl ToolOutput {
    /// Wraps a structured payload.
    #[must_use]
    pub const fn json(payload: Value) -> Self {
        Self {
            payload,
            text: None,
        }
    }
}

// ============================================================================
// SECTION: Dependencies
// ============================================================================

/// Shared state handlers operate on.
pub struct HandlerDeps {
    /// Connector registry.
    pub registry: Arc<ConnectorRegistry>,
    /// Snapshot store.
    pub snapshots: SnapshotStore,
    /// Operation audit trail.
    pub op_audit: Arc<AuditLogger>,
    /// Consistency comparator registry.
    pub comparators: ComparatorRegistry,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs the handler for a parsed tool call.
///
/// # Errors
///
/// Returns [`ToolError`] when the operation fails; the dispatcher encodes
/// it into the response.
pub async fn run(
    args: &ToolArgs,
    deps: &HandlerDeps,
    ctx: &TelemetryContext,
) -> Result<ToolOutput, ToolError> {
    match args {
        ToolArgs::ListConnectors => Ok(ToolOutput::json(json!({
            "connectors": deps.registry.list(),
        }))),
        ToolArgs::GetSchema(args) => {
            let connector = deps.registry.get(&args.connector_id)?;
            let schema = connector.get_schema(args.force_refresh).await?;
            Ok(ToolOutput::json(json!({"schema": schema})))
        }
        ToolArgs::ReadRecords(args) => {
            let connector = deps.registry.get(&args.connector_id)?;
            let filter = args
                .filter()
                .map_err(|message| ToolError::new("VALIDATION_ERROR", message))?;
            let result = connector.read_records(&filter).await?;
            Ok(ToolOutput::json(json!({
                "records": result.records,
                "total_count": result.total_count,
                "has_more": result.has_more,
                "next_cursor": result.next_cursor,
            })))
        }
        ToolArgs::WriteRecords(args) => write_records(args, deps, ctx).await,
        ToolArgs::ValidateRecords(args) => {
            let connector = deps.registry.get(&args.connector_id)?;
            let report = connector.validate_records(&args.records).await?;
            Ok(ToolOutput::json(json!({"validation": report})))
        }
        ToolArgs::CompareRecords(args) => {
            let source = deps.registry.get(&args.source_id)?;
            let target = deps.registry.get(&args.target_id)?;
            let options = CompareOptions {
                mappings: args.mappings.clone(),
                source_key: args.source_key.clone(),
                target_key: args.target_key.clone(),
                max_records: args.max_records,
            };
            let report =
                compare_connectors(source.as_ref(), target.as_ref(), &options, &deps.comparators)
                    .await?;
            let text = matches!(args.format, ReportFormat::Text)
                .then(|| render_comparison(&report));
            Ok(ToolOutput {
                payload: json!({"comparison": report}),
                text,
            })
        }
        ToolArgs::DetectChanges(args) => {
            let connector = deps.registry.get(&args.connector_id)?;
            let mode = match (&args.snapshot_id, &args.timestamp_field, &args.since) {
                (Some(snapshot_id), None, None) => ChangeDetectionMode::Snapshot {
                    snapshot_id: snapshot_id.clone(),
                },
                (None, Some(timestamp_field), Some(since)) => ChangeDetectionMode::Timestamp {
                    timestamp_field: timestamp_field.clone(),
                    since: since.clone(),
                },
                _ => {
                    return Err(ToolError::new(
                        "INVALID_OPTIONS",
                        "supply either snapshot_id or timestamp_field with since",
                    ));
                }
            };
            let options = ChangeDetectionOptions {
                mode,
                key_field: args.key_field.clone(),
                track_fields: args.track_fields.clone(),
                max_records: args.max_records,
            };
            let report = detect_changes(connector.as_ref(), &deps.snapshots, &options).await?;
            let text =
                matches!(args.format, ReportFormat::Text).then(|| render_changes(&report));
            Ok(ToolOutput {
                payload: json!({"changes": report}),
                text,
            })
        }
        ToolArgs::CreateSnapshot(args) => {
            let connector = deps.registry.get(&args.connector_id)?;
            require_connected(
                connector.as_ref(),
                datatrust_core::TrustErrorKind::ConnectorNotConnected,
            )?;
            let max_records = clamp_max_records(args.max_records);
            let records = load_records(
                connector.as_ref(),
                &datatrust_core::FilterOptions::default(),
                max_records,
            )
            .await?;
            let snapshot = Snapshot {
                meta: SnapshotMeta {
                    id: args.snapshot_id.clone(),
                    connector_id: args.connector_id.clone(),
                    created_at: Timestamp::now(),
                    record_count: records.len() as u64,
                },
                records,
                description: args.description.clone(),
            };
            deps.snapshots.create(&snapshot)?;
            Ok(ToolOutput::json(json!({"snapshot": snapshot.meta})))
        }
        ToolArgs::ListSnapshots(args) => {
            let mut snapshots = deps.snapshots.list()?;
            if let Some(connector_id) = &args.connector_id {
                snapshots.retain(|meta| &meta.connector_id == connector_id);
            }
            Ok(ToolOutput::json(json!({"snapshots": snapshots})))
        }
        ToolArgs::DeleteSnapshot(args) => {
            deps.snapshots.delete(&args.snapshot_id)?;
            Ok(ToolOutput::json(json!({"deleted": args.snapshot_id})))
        }
        ToolArgs::QueryAuditLog(args) => {
            let parse_bound = |value: &Option<String>, name: &str| {
                value
                    .as_deref()
                    .map(|text| {
                        Timestamp::parse_rfc3339(text).ok_or_else(|| {
                            ToolError::new(
                                "INVALID_OPTIONS",
                                format!("`{name}` must be an RFC3339 timestamp"),
                            )
                        })
                    })
                    .transpose()
            };
            let query = AuditQuery {
                connector_id: args.connector_id.clone(),
                operations: args.operations.clone(),
                record_key: args.record_key.clone(),
                user: args.user.clone(),
                from: parse_bound(&args.from, "from")?,
                to: parse_bound(&args.to, "to")?,
                limit: args.limit,
                offset: args.offset,
            };
            let result = deps.op_audit.query(&query)?;
            Ok(ToolOutput::json(json!({"audit": result})))
        }
        ToolArgs::ReconcileRecords(args) => {
            let source = deps.registry.get(&args.source_id)?;
            let target = deps.registry.get(&args.target_id)?;
            let options = ReconcileOptions {
                rules: args.rules.clone(),
                min_confidence: args.min_confidence.unwrap_or(50.0),
                blocking: args.blocking.clone().unwrap_or_default(),
                max_records: args.max_records,
            };
            let report =
                reconcile_connectors(source.as_ref(), target.as_ref(), &options).await?;
            let text =
                matches!(args.format, ReportFormat::Text).then(|| render_reconcile(&report));
            Ok(ToolOutput {
                payload: json!({"reconciliation": report}),
                text,
            })
        }
    }
}

// ============================================================================
// SECTION: Write Gate
// ============================================================================

/// Runs the gated write sequence.
async fn write_records(
    args: &WriteRecordsArgs,
    deps: &HandlerDeps,
    ctx: &TelemetryContext,
) -> Result<ToolOutput, ToolError> {
    let connector = deps.registry.get(&args.connector_id)?;
    let info = connector.info();

    // Schema-backed connector types reject fields the schema does not know.
    if SCHEMA_BACKED_TYPES.contains(&info.connector_type.as_str()) {
        let schema = connector.get_schema(false).await?;
        let known = schema.field_names();
        for (index, record) in args.records.iter().enumerate() {
            for field in record.field_names() {
                if !known.contains(field) {
                    return Err(ToolError::new(
                        "SCHEMA_MISMATCH",
                        format!("record {index} field `{field}` is not present in the schema"),
                    ));
                }
            }
        }
    }

    // All records must validate; partially valid batches never reach the
    // connector.
    let validation = connector.validate_records(&args.records).await?;
    if !validation.valid {
        return Err(ToolError {
            kind: "VALIDATION_ERROR".to_string(),
            message: format!(
                "{} of {} records failed validation; no records were written",
                validation.records.iter().filter(|record| !record.valid).count(),
                args.records.len(),
            ),
            suggestion: Some("fix the reported records and resubmit the batch".to_string()),
        });
    }

    let result = connector.write_records(&args.records, args.mode).await?;

    // Written records must land in the operation audit trail; a failed
    // append fails the call.
    let operation = match args.mode {
        WriteMode::Insert => AuditOperation::Create,
        WriteMode::Update | WriteMode::Upsert => AuditOperation::Update,
    };
    let failed_indexes: Vec<usize> =
        result.errors.iter().map(|detail| detail.index).collect();
    for (index, record) in args.records.iter().enumerate() {
        if failed_indexes.contains(&index) {
            continue;
        }
        let entry = AuditEntry {
            entry_id: deps.op_audit.next_entry_id(),
            timestamp: Timestamp::now(),
            connector_id: args.connector_id.clone(),
            operation,
            record_key: record_key(record),
            user: args.user.clone().or_else(|| ctx.identity.subject.clone()),
            before: None,
            after: Some(record.clone()),
            changed_fields: None,
            metadata: Some(json!({
                "trace_id": ctx.trace_id,
                "decision_id": ctx.decision_id,
                "mode": args.mode.as_str(),
            })),
        };
        deps.op_audit.append(&entry).await.map_err(|err| ToolError {
            kind: err.kind.as_str().to_string(),
            message: format!("write succeeded but audit append failed: {}", err.message),
            suggestion: Some("restore the audit directory before further writes".to_string()),
        })?;
    }

    Ok(ToolOutput::json(json!({"write": result})))
}

/// Derives the audit record key from common key fields.
fn record_key(record: &Record) -> String {
    for candidate in ["id", "key", "email", "name"] {
        if let Some(value) = record.get(candidate) {
            return match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
        }
    }
    String::from("(unkeyed)")
}
