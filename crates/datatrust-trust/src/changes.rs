// crates/datatrust-trust/src/changes.rs
// ============================================================================
// Module: Change Detector
// Description: Timestamp- and snapshot-based change detection.
// Purpose: Report added, deleted, and modified records for a connector.
// Dependencies: datatrust-core, serde, crate::{loader, snapshot}
// ============================================================================

//! ## Overview
//! Timestamp mode filters the connector for records whose timestamp field
//! is newer than `since`; it cannot tell additions from modifications, so
//! everything reports as modified. Snapshot mode diffs the current record
//! set against a stored snapshot keyed by `key_field`: added (current only),
//! deleted (snapshot only), and modified (both sides with at least one
//! differing field). Containers compare by deep JSON equality, primitives
//! strictly, RFC3339 date strings by epoch milliseconds, and a missing
//! field is conflated with an explicit null.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use datatrust_core::Connector;
use datatrust_core::FilterCondition;
use datatrust_core::FilterOperator;
use datatrust_core::FilterOptions;
use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_core::TrustError;
use datatrust_core::TrustErrorKind;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::loader::clamp_max_records;
use crate::loader::load_records;
use crate::loader::require_connected;
use crate::snapshot::SnapshotStore;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Change-detection mode and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ChangeDetectionMode {
    /// Query records newer than `since` by a timestamp field.
    Timestamp {
        /// Field holding the record timestamp.
        timestamp_field: String,
        /// Exclusive lower bound (RFC3339 or epoch-ms rendering).
        since: Value,
    },
    /// Diff the current records against a stored snapshot.
    Snapshot {
        /// Snapshot identifier.
        snapshot_id: String,
    },
}

/// Change-detection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDetectionOptions {
    /// Detection mode.
    #[serde(flatten)]
    pub mode: ChangeDetectionMode,
    /// Key field for snapshot diffing.
    pub key_field: String,
    /// Restrict modification checks to these fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_fields: Vec<String>,
    /// Record bound; clamped to the absolute cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u64>,
}

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// One changed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Key value rendered as a string.
    pub key: String,
    /// Changed field names; empty in timestamp mode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    /// Record image, when available for the change kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

/// Full change-detection report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Connector the detection ran against.
    pub connector_id: String,
    /// Mode label: `timestamp` or `snapshot`.
    pub mode: String,
    /// Added records (current only).
    pub added: Vec<ChangeEntry>,
    /// Deleted records (snapshot only).
    pub deleted: Vec<ChangeEntry>,
    /// Modified records.
    pub modified: Vec<ChangeEntry>,
    /// Total change count.
    pub total: u64,
}

// ============================================================================
// SECTION: Detection
// ============================================================================

/// Detects changes for a connector.
///
/// # Errors
///
/// Returns [`TrustError`] for disconnected connectors, snapshot problems,
/// or connector read failures. A snapshot taken from a different connector
/// fails with `CONNECTOR_MISMATCH` before any records are read.
pub async fn detect_changes(
    connector: &dyn Connector,
    store: &SnapshotStore,
    options: &ChangeDetectionOptions,
) -> Result<ChangeReport, TrustError> {
    require_connected(connector, TrustErrorKind::ConnectorNotConnected)?;
    let connector_id = connector.info().id;
    let max_records = clamp_max_records(options.max_records);

    match &options.mode {
        ChangeDetectionMode::Timestamp {
            timestamp_field,
            since,
        } => {
            let filter = FilterOptions {
                conditions: vec![FilterCondition::new(
                    timestamp_field.clone(),
                    FilterOperator::Gt,
                    since.clone(),
                )],
                ..FilterOptions::default()
            };
            let records = load_records(connector, &filter, max_records).await?;
            // Timestamp mode cannot distinguish added from modified rows.
            let modified: Vec<ChangeEntry> = records
                .into_iter()
                .map(|record| ChangeEntry {
                    key: key_string(&record, &options.key_field),
                    changed_fields: Vec::new(),
                    record: Some(record),
                })
                .collect();
            Ok(ChangeReport {
                connector_id,
                mode: "timestamp".to_string(),
                total: modified.len() as u64,
                added: Vec::new(),
                deleted: Vec::new(),
                modified,
            })
        }
        ChangeDetectionMode::Snapshot {
            snapshot_id,
        } => {
            let snapshot = store.load(snapshot_id)?;
            if snapshot.meta.connector_id != connector_id {
                return Err(TrustError::new(
                    TrustErrorKind::ConnectorMismatch,
                    format!(
                        "snapshot `{snapshot_id}` belongs to connector `{}`, not `{connector_id}`",
                        snapshot.meta.connector_id
                    ),
                )
                .with_suggestion("create a snapshot from this connector first"));
            }

            let current = load_records(connector, &FilterOptions::default(), max_records).await?;
            let snapshot_index = index_by_key(&snapshot.records, &options.key_field);
            let current_index = index_by_key(&current, &options.key_field);

            let mut added = Vec::new();
            let mut modified = Vec::new();
            for (key, record) in &current_index {
                match snapshot_index.get(key) {
                    None => added.push(ChangeEntry {
                        key: key.clone(),
                        changed_fields: Vec::new(),
                        record: Some((*record).clone()),
                    }),
                    Some(previous) => {
                        let changed = changed_fields(previous, record, &options.track_fields);
                        if !changed.is_empty() {
                            modified.push(ChangeEntry {
                                key: key.clone(),
                                changed_fields: changed,
                                record: Some((*record).clone()),
                            });
                        }
                    }
                }
            }
            let deleted: Vec<ChangeEntry> = snapshot_index
                .iter()
                .filter(|(key, _)| !current_index.contains_key(*key))
                .map(|(key, record)| ChangeEntry {
                    key: key.clone(),
                    changed_fields: Vec::new(),
                    record: Some((*record).clone()),
                })
                .collect();

            Ok(ChangeReport {
                connector_id,
                mode: "snapshot".to_string(),
                total: (added.len() + deleted.len() + modified.len()) as u64,
                added,
                deleted,
                modified,
            })
        }
    }
}

/// Indexes records by their rendered key value.
fn index_by_key<'a>(records: &'a [Record], key_field: &str) -> BTreeMap<String, &'a Record> {
    let mut index = BTreeMap::new();
    for record in records {
        index.entry(key_string(record, key_field)).or_insert(record);
    }
    index
}

/// Renders a record's key value as a string.
fn key_string(record: &Record, key_field: &str) -> String {
    match record.get(key_field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Returns the fields whose values differ between two records.
fn changed_fields(previous: &Record, current: &Record, track_fields: &[String]) -> Vec<String> {
    let fields: BTreeSet<String> = if track_fields.is_empty() {
        previous
            .field_names()
            .chain(current.field_names())
            .map(str::to_string)
            .collect()
    } else {
        track_fields.iter().cloned().collect()
    };

    fields
        .into_iter()
        .filter(|field| !values_equal(previous.get(field), current.get(field)))
        .collect()
}

/// Equality with null/missing conflation and epoch-aware date strings.
fn values_equal(previous: Option<&Value>, current: Option<&Value>) -> bool {
    let previous = previous.unwrap_or(&Value::Null);
    let current = current.unwrap_or(&Value::Null);
    if let (Value::String(a), Value::String(b)) = (previous, current)
        && let (Some(a), Some(b)) =
            (Timestamp::parse_rfc3339(a), Timestamp::parse_rfc3339(b))
    {
        return a == b;
    }
    // Deep equality for containers, strict equality for primitives.
    previous == current
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::Record;
    use serde_json::json;

    use super::changed_fields;
    use super::values_equal;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn missing_and_null_are_conflated() {
        let previous = record(json!({"a": null}));
        let current = record(json!({}));
        assert!(changed_fields(&previous, &current, &[]).is_empty());
    }

    #[test]
    fn equivalent_rfc3339_instants_are_equal() {
        assert!(values_equal(
            Some(&json!("2026-02-01T10:00:00Z")),
            Some(&json!("2026-02-01T11:00:00+01:00")),
        ));
        assert!(!values_equal(
            Some(&json!("2026-02-01T10:00:00Z")),
            Some(&json!("2026-02-01T10:00:01Z")),
        ));
    }

    #[test]
    fn track_fields_scope_modification_checks() {
        let previous = record(json!({"id": 1, "v": "x", "noise": 1}));
        let current = record(json!({"id": 1, "v": "x", "noise": 2}));
        assert_eq!(changed_fields(&previous, &current, &[]).len(), 1);
        assert!(changed_fields(&previous, &current, &["v".to_string()]).is_empty());
    }
}
