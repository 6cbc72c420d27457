// crates/datatrust-trust/tests/consistency_and_changes.rs
// ============================================================================
// Module: Consistency and Change Detection Tests
// Description: End-to-end trust primitives over memory connectors.
// Purpose: Validate comparison, snapshot diffing, and bound behavior.
// ============================================================================

//! Consistency monitor and change detector tests against memory connectors.

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

use datatrust_connectors::MemoryConnector;
use datatrust_connectors::MemoryOptions;
use datatrust_core::Connector;
use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_core::TrustErrorKind;
use datatrust_trust::ChangeDetectionMode;
use datatrust_trust::ChangeDetectionOptions;
use datatrust_trust::CompareOptions;
use datatrust_trust::ComparatorRegistry;
use datatrust_trust::FieldMapping;
use datatrust_trust::Snapshot;
use datatrust_trust::SnapshotMeta;
use datatrust_trust::SnapshotStore;
use datatrust_trust::compare_connectors;
use datatrust_trust::detect_changes;
use serde_json::json;
use tempfile::TempDir;

fn records(values: &[serde_json::Value]) -> Vec<Record> {
    values.iter().map(|value| Record::from_value(value.clone()).unwrap()).collect()
}

async fn connector(id: &str, seed: Vec<Record>) -> MemoryConnector {
    let connector = MemoryConnector::new(MemoryOptions {
        id: id.to_string(),
        name: id.to_string(),
        readonly: false,
        key_field: Some("id".to_string()),
        seed,
    });
    connector.connect().await.unwrap();
    connector
}

fn mapping(field: &str) -> FieldMapping {
    FieldMapping {
        source_field: field.to_string(),
        target_field: field.to_string(),
        transform: None,
        comparator: None,
    }
}

fn compare_options(mappings: Vec<FieldMapping>) -> CompareOptions {
    CompareOptions {
        mappings,
        source_key: vec!["id".to_string()],
        target_key: vec!["id".to_string()],
        max_records: None,
    }
}

#[tokio::test]
async fn identical_datasets_compare_clean() {
    let data = records(&[
        json!({"id": 1, "email": "a@x", "name": "A"}),
        json!({"id": 2, "email": "b@x", "name": "B"}),
    ]);
    let source = connector("src", data.clone()).await;
    let target = connector("dst", data).await;

    let report = compare_connectors(
        &source,
        &target,
        &compare_options(vec![mapping("email"), mapping("name")]),
        &ComparatorRegistry::with_builtins(),
    )
    .await
    .unwrap();

    assert_eq!(report.summary.match_count, 2);
    assert_eq!(report.summary.difference_count, 0);
    assert_eq!(report.summary.source_only, 0);
    assert_eq!(report.summary.target_only, 0);
}

#[tokio::test]
async fn differences_and_one_sided_keys_are_classified() {
    let source = connector(
        "src",
        records(&[
            json!({"id": 1, "name": "Ada"}),
            json!({"id": 2, "name": "Grace"}),
        ]),
    )
    .await;
    let target = connector(
        "dst",
        records(&[
            json!({"id": 1, "name": "Ada L."}),
            json!({"id": 3, "name": "Edsger"}),
        ]),
    )
    .await;

    let report = compare_connectors(
        &source,
        &target,
        &compare_options(vec![mapping("name")]),
        &ComparatorRegistry::with_builtins(),
    )
    .await
    .unwrap();

    assert_eq!(report.summary.difference_count, 1);
    assert_eq!(report.summary.source_only, 1);
    assert_eq!(report.summary.target_only, 1);
    let difference = report
        .records
        .iter()
        .find(|record| record.key == "1")
        .unwrap();
    assert_eq!(difference.differences.len(), 1);
}

#[tokio::test]
async fn transforms_and_named_comparators_apply() {
    let source = connector("src", records(&[json!({"id": 1, "name": "  ADA  "})])).await;
    let target = connector("dst", records(&[json!({"id": 1, "name": "ada"})])).await;

    let options = compare_options(vec![FieldMapping {
        source_field: "name".to_string(),
        target_field: "name".to_string(),
        transform: Some(datatrust_trust::Transform::Trim),
        comparator: Some("caseInsensitive".to_string()),
    }]);
    let report = compare_connectors(
        &source,
        &target,
        &options,
        &ComparatorRegistry::with_builtins(),
    )
    .await
    .unwrap();
    assert_eq!(report.summary.match_count, 1);
}

#[tokio::test]
async fn max_records_zero_yields_empty_comparison() {
    let source = connector("src", records(&[json!({"id": 1})])).await;
    let target = connector("dst", records(&[json!({"id": 1})])).await;

    let mut options = compare_options(vec![mapping("id")]);
    options.max_records = Some(0);
    let report = compare_connectors(
        &source,
        &target,
        &options,
        &ComparatorRegistry::with_builtins(),
    )
    .await
    .unwrap();
    assert_eq!(report.summary.source_count, 0);
    assert_eq!(report.summary.target_count, 0);
    assert!(report.records.is_empty());
}

#[tokio::test]
async fn snapshot_diff_reports_added_deleted_modified() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path());
    store
        .create(&Snapshot {
            meta: SnapshotMeta {
                id: "baseline".to_string(),
                connector_id: "inventory".to_string(),
                created_at: Timestamp::from_millis(1),
                record_count: 2,
            },
            records: records(&[
                json!({"id": 1, "v": "x"}),
                json!({"id": 2, "v": "y"}),
            ]),
            description: None,
        })
        .unwrap();

    let current = connector(
        "inventory",
        records(&[
            json!({"id": 1, "v": "x-new"}),
            json!({"id": 3, "v": "z"}),
        ]),
    )
    .await;

    let report = detect_changes(
        &current,
        &store,
        &ChangeDetectionOptions {
            mode: ChangeDetectionMode::Snapshot {
                snapshot_id: "baseline".to_string(),
            },
            key_field: "id".to_string(),
            track_fields: Vec::new(),
            max_records: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.added[0].key, "3");
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.deleted[0].key, "2");
    assert_eq!(report.modified.len(), 1);
    assert_eq!(report.modified[0].key, "1");
    assert_eq!(report.modified[0].changed_fields, vec!["v".to_string()]);
}

#[tokio::test]
async fn snapshot_of_current_state_detects_nothing() {
    let data = records(&[json!({"id": 1, "v": "x"}), json!({"id": 2, "v": "y"})]);
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path());
    store
        .create(&Snapshot {
            meta: SnapshotMeta {
                id: "now".to_string(),
                connector_id: "inventory".to_string(),
                created_at: Timestamp::from_millis(1),
                record_count: data.len() as u64,
            },
            records: data.clone(),
            description: None,
        })
        .unwrap();
    let current = connector("inventory", data).await;

    let report = detect_changes(
        &current,
        &store,
        &ChangeDetectionOptions {
            mode: ChangeDetectionMode::Snapshot {
                snapshot_id: "now".to_string(),
            },
            key_field: "id".to_string(),
            track_fields: Vec::new(),
            max_records: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(report.total, 0);
}

#[tokio::test]
async fn foreign_snapshot_fails_with_connector_mismatch() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path());
    store
        .create(&Snapshot {
            meta: SnapshotMeta {
                id: "other".to_string(),
                connector_id: "somewhere-else".to_string(),
                created_at: Timestamp::from_millis(1),
                record_count: 0,
            },
            records: Vec::new(),
            description: None,
        })
        .unwrap();
    let current = connector("inventory", Vec::new()).await;

    let err = detect_changes(
        &current,
        &store,
        &ChangeDetectionOptions {
            mode: ChangeDetectionMode::Snapshot {
                snapshot_id: "other".to_string(),
            },
            key_field: "id".to_string(),
            track_fields: Vec::new(),
            max_records: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind, TrustErrorKind::ConnectorMismatch);
}

#[tokio::test]
async fn timestamp_mode_classifies_everything_as_modified() {
    let current = connector(
        "events",
        records(&[
            json!({"id": 1, "updated_at": "2026-02-01T10:00:00Z"}),
            json!({"id": 2, "updated_at": "2026-01-01T10:00:00Z"}),
        ]),
    )
    .await;
    let store = SnapshotStore::new(TempDir::new().unwrap().path());

    let report = detect_changes(
        &current,
        &store,
        &ChangeDetectionOptions {
            mode: ChangeDetectionMode::Timestamp {
                timestamp_field: "updated_at".to_string(),
                since: json!("2026-01-15T00:00:00Z"),
            },
            key_field: "id".to_string(),
            track_fields: Vec::new(),
            max_records: None,
        },
    )
    .await
    .unwrap();

    assert!(report.added.is_empty());
    assert!(report.deleted.is_empty());
    assert_eq!(report.modified.len(), 1);
    assert_eq!(report.modified[0].key, "1");
}

#[tokio::test]
async fn disconnected_source_fails_before_reading() {
    let source = MemoryConnector::new(MemoryOptions {
        id: "src".to_string(),
        name: "src".to_string(),
        readonly: false,
        key_field: None,
        seed: Vec::new(),
    });
    let target = connector("dst", Vec::new()).await;
    let err = compare_connectors(
        &source,
        &target,
        &compare_options(vec![mapping("id")]),
        &ComparatorRegistry::with_builtins(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind, TrustErrorKind::SourceNotConnected);
}
