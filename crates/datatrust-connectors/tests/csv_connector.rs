// crates/datatrust-connectors/tests/csv_connector.rs
// ============================================================================
// Module: CSV Connector Tests
// Description: File-level tests for the CSV connector.
// Purpose: Validate round trips, sanitization, and schema cache behavior.
// ============================================================================

//! CSV connector behavior tests against temporary files.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;

use datatrust_core::Connector;
use datatrust_core::FieldType;
use datatrust_core::FilterCondition;
use datatrust_core::FilterOperator;
use datatrust_core::FilterOptions;
use datatrust_core::Record;
use datatrust_core::WriteMode;
use datatrust_connectors::CsvFormat;
use datatrust_connectors::FileConnector;
use datatrust_connectors::FileOptions;
use datatrust_connectors::FileStore;
use serde_json::json;
use tempfile::TempDir;

fn connector(dir: &TempDir, file: &str) -> FileConnector {
    FileConnector::new(
        FileOptions {
            id: "csv-users".to_string(),
            name: "users".to_string(),
            readonly: false,
            key_field: Some("id".to_string()),
        },
        FileStore::new(dir.path().join(file)),
        Box::new(CsvFormat::default()),
    )
}

#[tokio::test]
async fn missing_file_reads_as_empty_source() {
    let dir = TempDir::new().unwrap();
    let csv = connector(&dir, "missing.csv");
    csv.connect().await.unwrap();
    let result = csv.read_records(&FilterOptions::default()).await.unwrap();
    assert!(result.records.is_empty());
    let schema = csv.get_schema(false).await.unwrap();
    assert!(schema.fields.is_empty());
}

#[tokio::test]
async fn write_then_read_round_trips_and_filters() {
    let dir = TempDir::new().unwrap();
    let csv = connector(&dir, "users.csv");
    csv.connect().await.unwrap();

    let batch = vec![
        Record::from_value(json!({"id": 1, "email": "a@x", "name": "A"})).unwrap(),
        Record::from_value(json!({"id": 2, "email": "b@x", "name": "B"})).unwrap(),
    ];
    let written = csv.write_records(&batch, WriteMode::Insert).await.unwrap();
    assert_eq!(written.success, 2);

    let filtered = csv
        .read_records(&FilterOptions {
            conditions: vec![FilterCondition::new("name", FilterOperator::Eq, json!("B"))],
            ..FilterOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.records.len(), 1);
    assert_eq!(filtered.records[0].get("id"), Some(&json!(2)));
    assert!(!filtered.has_more);
}

#[tokio::test]
async fn formula_cells_never_reach_disk_unescaped() {
    let dir = TempDir::new().unwrap();
    let csv = connector(&dir, "formulas.csv");
    csv.connect().await.unwrap();

    let batch = vec![Record::from_value(json!({"name": "=2+2"})).unwrap()];
    csv.write_records(&batch, WriteMode::Insert).await.unwrap();

    let on_disk = fs::read_to_string(dir.path().join("formulas.csv")).unwrap();
    assert!(on_disk.contains("'=2+2"));
    for line in on_disk.lines().skip(1) {
        assert!(!line.starts_with('='), "unescaped formula in line: {line}");
    }
}

#[tokio::test]
async fn writes_invalidate_the_inferred_schema_cache() {
    let dir = TempDir::new().unwrap();
    let csv = connector(&dir, "cache.csv");
    csv.connect().await.unwrap();

    csv.write_records(
        &[Record::from_value(json!({"id": 1})).unwrap()],
        WriteMode::Insert,
    )
    .await
    .unwrap();
    let before = csv.get_schema(false).await.unwrap();
    assert!(before.field("note").is_none());

    csv.write_records(
        &[Record::from_value(json!({"id": 2, "note": "n"})).unwrap()],
        WriteMode::Insert,
    )
    .await
    .unwrap();
    let after = csv.get_schema(false).await.unwrap();
    assert_eq!(after.field("note").unwrap().field_type, FieldType::String);
}

#[tokio::test]
async fn update_mode_rewrites_matched_rows() {
    let dir = TempDir::new().unwrap();
    let csv = connector(&dir, "update.csv");
    csv.connect().await.unwrap();

    csv.write_records(
        &[
            Record::from_value(json!({"id": 1, "name": "A"})).unwrap(),
            Record::from_value(json!({"id": 2, "name": "B"})).unwrap(),
        ],
        WriteMode::Insert,
    )
    .await
    .unwrap();

    let result = csv
        .write_records(
            &[Record::from_value(json!({"id": 2, "name": "B-new"})).unwrap()],
            WriteMode::Update,
        )
        .await
        .unwrap();
    assert_eq!(result.success, 1);

    let all = csv.read_records(&FilterOptions::default()).await.unwrap();
    assert_eq!(all.records.len(), 2);
    let updated = all.records.iter().find(|r| r.get("id") == Some(&json!(2))).unwrap();
    assert_eq!(updated.get("name"), Some(&json!("B-new")));
}
