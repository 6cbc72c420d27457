// crates/datatrust-trust/tests/audit_log.rs
// ============================================================================
// Module: Operation Audit Trail Tests
// Description: Append, layout, legacy reads, and query behavior.
// Purpose: Pin the on-disk trail format and the query engine semantics.
// ============================================================================

//! Audit trail tests over temporary directories.

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

use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_trust::AuditEntry;
use datatrust_trust::AuditLogger;
use datatrust_trust::AuditOperation;
use datatrust_trust::AuditQuery;
use serde_json::json;
use tempfile::TempDir;

fn entry(
    logger: &AuditLogger,
    connector_id: &str,
    operation: AuditOperation,
    record_key: &str,
    timestamp: &str,
    user: Option<&str>,
) -> AuditEntry {
    AuditEntry {
        entry_id: logger.next_entry_id(),
        timestamp: Timestamp::parse_rfc3339(timestamp).unwrap(),
        connector_id: connector_id.to_string(),
        operation,
        record_key: record_key.to_string(),
        user: user.map(str::to_string),
        before: None,
        after: Some(Record::from_value(json!({"id": record_key})).unwrap()),
        changed_fields: None,
        metadata: None,
    }
}

#[tokio::test]
async fn entries_land_in_daily_files_under_sanitized_dirs() {
    let dir = TempDir::new().unwrap();
    let logger = AuditLogger::new(dir.path(), None);

    logger
        .append(&entry(
            &logger,
            "crm/prod",
            AuditOperation::Create,
            "1",
            "2026-02-01T10:00:00Z",
            None,
        ))
        .await
        .unwrap();
    logger
        .append(&entry(
            &logger,
            "crm/prod",
            AuditOperation::Update,
            "1",
            "2026-02-02T10:00:00Z",
            None,
        ))
        .await
        .unwrap();

    let base = dir.path().join("crm_prod");
    assert!(base.join("2026-02-01.ndjson").exists());
    assert!(base.join("2026-02-02.ndjson").exists());
    let first_day = fs::read_to_string(base.join("2026-02-01.ndjson")).unwrap();
    assert_eq!(first_day.lines().count(), 1);
}

#[tokio::test]
async fn query_filters_sorts_desc_and_counts_before_pagination() {
    let dir = TempDir::new().unwrap();
    let logger = AuditLogger::new(dir.path(), None);

    for (operation, key, timestamp, user) in [
        (AuditOperation::Create, "1", "2026-02-01T08:00:00Z", Some("amy")),
        (AuditOperation::Update, "1", "2026-02-01T09:00:00Z", Some("amy")),
        (AuditOperation::Update, "2", "2026-02-01T10:00:00Z", Some("bob")),
        (AuditOperation::Delete, "1", "2026-02-02T11:00:00Z", Some("amy")),
    ] {
        logger
            .append(&entry(&logger, "crm", operation, key, timestamp, user))
            .await
            .unwrap();
    }

    let result = logger
        .query(&AuditQuery {
            connector_id: "crm".to_string(),
            limit: Some(2),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(result.total, 4);
    assert_eq!(result.create_count, 1);
    assert_eq!(result.update_count, 2);
    assert_eq!(result.delete_count, 1);
    assert_eq!(result.entries.len(), 2);
    // Newest first.
    assert_eq!(result.entries[0].operation, AuditOperation::Delete);

    let by_user = logger
        .query(&AuditQuery {
            connector_id: "crm".to_string(),
            user: Some("bob".to_string()),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(by_user.total, 1);
    assert_eq!(by_user.entries[0].record_key, "2");

    let by_key_and_op = logger
        .query(&AuditQuery {
            connector_id: "crm".to_string(),
            record_key: Some("1".to_string()),
            operations: vec![AuditOperation::Update],
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(by_key_and_op.total, 1);

    let windowed = logger
        .query(&AuditQuery {
            connector_id: "crm".to_string(),
            from: Timestamp::parse_rfc3339("2026-02-02T00:00:00Z"),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(windowed.total, 1);
}

#[tokio::test]
async fn legacy_array_files_are_read_transparently() {
    let dir = TempDir::new().unwrap();
    let logger = AuditLogger::new(dir.path(), None);
    let legacy_dir = dir.path().join("crm");
    fs::create_dir_all(&legacy_dir).unwrap();

    let legacy = json!([{
        "entry_id": "legacy-1",
        "timestamp": 1_700_000_000_000_i64,
        "connector_id": "crm",
        "operation": "create",
        "record_key": "9"
    }]);
    fs::write(legacy_dir.join("2023-11-14.ndjson"), legacy.to_string()).unwrap();

    let result = logger
        .query(&AuditQuery {
            connector_id: "crm".to_string(),
            ..AuditQuery::default()
        })
        .unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.entries[0].entry_id, "legacy-1");
}

#[tokio::test]
async fn concurrent_appends_to_one_path_never_interleave() {
    let dir = TempDir::new().unwrap();
    let logger = std::sync::Arc::new(AuditLogger::new(dir.path(), None));

    let mut handles = Vec::new();
    for worker in 0..8_u32 {
        let logger = std::sync::Arc::clone(&logger);
        handles.push(tokio::spawn(async move {
            for sequence in 0..16_u32 {
                let item = entry(
                    &logger,
                    "busy",
                    AuditOperation::Create,
                    &format!("{worker}-{sequence}"),
                    "2026-02-01T10:00:00Z",
                    None,
                );
                logger.append(&item).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let text = fs::read_to_string(dir.path().join("busy").join("2026-02-01.ndjson")).unwrap();
    let mut count = 0;
    for line in text.lines() {
        // Every line must parse as a complete entry.
        let _: AuditEntry = serde_json::from_str(line).unwrap();
        count += 1;
    }
    assert_eq!(count, 128);
}

#[tokio::test]
async fn retention_prunes_files_older_than_the_window() {
    let dir = TempDir::new().unwrap();
    let logger = AuditLogger::new(dir.path(), Some(30));
    let connector_dir = dir.path().join("crm");
    fs::create_dir_all(&connector_dir).unwrap();
    fs::write(connector_dir.join("2020-01-01.ndjson"), "").unwrap();

    logger
        .append(&entry(
            &logger,
            "crm",
            AuditOperation::Create,
            "1",
            &Timestamp::now().to_rfc3339(),
            None,
        ))
        .await
        .unwrap();
    assert!(!connector_dir.join("2020-01-01.ndjson").exists());
}
