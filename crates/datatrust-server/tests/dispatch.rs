// crates/datatrust-server/tests/dispatch.rs
// ============================================================================
// Module: Dispatch Pipeline Tests
// Description: End-to-end tool dispatch over real connectors and sinks.
// Purpose: Validate masking, approval gating, auditing, and tool flows.
// ============================================================================

//! Dispatch pipeline scenarios against temporary files and in-memory state.

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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use datatrust_connectors::ConnectorRegistry;
use datatrust_connectors::CsvFormat;
use datatrust_connectors::FileConnector;
use datatrust_connectors::FileOptions;
use datatrust_connectors::FileStore;
use datatrust_connectors::MemoryConnector;
use datatrust_connectors::MemoryOptions;
use datatrust_core::CompiledPolicy;
use datatrust_core::Connector;
use datatrust_core::Identity;
use datatrust_core::Record;
use datatrust_core::policy::MaskingPolicy;
use datatrust_core::policy::Policy;
use datatrust_core::policy::WriteGateMode;
use datatrust_core::policy::WritePolicy;
use datatrust_governance::GovernanceConfig;
use datatrust_governance::Governed;
use datatrust_governance::HealthRegistry;
use datatrust_server::DispatchRequest;
use datatrust_server::Dispatcher;
use datatrust_server::MetricsRegistry;
use datatrust_server::PolicyAuditSink;
use datatrust_server::approval::RejectingApprovalDecider;
use datatrust_server::telemetry::CaptureLogSink;
use datatrust_server::tools::handlers::HandlerDeps;
use datatrust_trust::AuditLogger;
use datatrust_trust::ComparatorRegistry;
use datatrust_trust::SnapshotStore;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

/// Test fixture bundling the dispatcher and its filesystem roots.
struct Fixture {
    dispatcher: Dispatcher,
    dir: TempDir,
}

impl Fixture {
    async fn dispatch(&self, tool: &str, arguments: Value) -> datatrust_server::ToolResponse {
        self.dispatcher
            .dispatch(DispatchRequest {
                tool: tool.to_string(),
                arguments,
                identity: Identity {
                    subject: Some("agent-1".to_string()),
                    ..Identity::default()
                },
                break_glass: false,
                traceparent: None,
                remote_ip: None,
            })
            .await
    }

    fn policy_audit_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("policy-audit")
    }
}

async fn governed(connector: Arc<dyn Connector>) -> Arc<Governed> {
    let wrapped = Arc::new(Governed::new(
        connector,
        GovernanceConfig::default(),
        Arc::new(datatrust_governance::NoopGovernanceMetrics),
        Arc::new(HealthRegistry::new()),
    ));
    wrapped.connect().await.unwrap();
    wrapped
}

async fn fixture(policy: Policy, approval_token: Option<&str>) -> Fixture {
    let dir = TempDir::new().unwrap();

    // csv-users connector seeded with two rows.
    fs::write(
        dir.path().join("users.csv"),
        "id,email,name\n1,a@x,A\n2,b@x,B\n",
    )
    .unwrap();
    let csv = FileConnector::new(
        FileOptions {
            id: "csv-users".to_string(),
            name: "users".to_string(),
            readonly: false,
            key_field: Some("id".to_string()),
        },
        FileStore::new(dir.path().join("users.csv")),
        Box::new(CsvFormat::default()),
    );

    let memory = MemoryConnector::new(MemoryOptions {
        id: "mem-inventory".to_string(),
        name: "inventory".to_string(),
        readonly: false,
        key_field: Some("id".to_string()),
        seed: vec![
            Record::from_value(json!({"id": 1, "v": "x"})).unwrap(),
            Record::from_value(json!({"id": 2, "v": "y"})).unwrap(),
        ],
    });

    let mut registry = ConnectorRegistry::new();
    registry.insert(governed(Arc::new(csv)).await).unwrap();
    registry.insert(governed(Arc::new(memory)).await).unwrap();

    let deps = HandlerDeps {
        registry: Arc::new(registry),
        snapshots: SnapshotStore::new(dir.path().join("snapshots")),
        op_audit: Arc::new(AuditLogger::new(dir.path().join("audit"), None)),
        comparators: ComparatorRegistry::with_builtins(),
    };
    let policy_audit = Arc::new(
        PolicyAuditSink::new(dir.path().join("policy-audit"), 10 * 1024 * 1024, None).unwrap(),
    );
    let dispatcher = Dispatcher::new(
        deps,
        CompiledPolicy::compile(policy).unwrap(),
        BTreeMap::new(),
        approval_token.map(str::to_string),
        Arc::new(RejectingApprovalDecider),
        policy_audit,
        25,
        Duration::from_millis(120_000),
        Arc::new(MetricsRegistry::new()),
        Arc::new(CaptureLogSink::new()),
    );
    Fixture {
        dispatcher,
        dir,
    }
}

/// Reads every decision id persisted under the policy audit directory.
fn audited_decision_ids(dir: &Path) -> Vec<String> {
    let mut ids = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let text = fs::read_to_string(entry.path()).unwrap();
            for line in text.lines() {
                let value: Value = serde_json::from_str(line).unwrap();
                ids.push(value["decision_id"].as_str().unwrap().to_string());
            }
        }
    }
    ids
}

#[tokio::test]
async fn read_with_masking_redacts_emails() {
    let policy = Policy {
        masking: MaskingPolicy {
            fields: vec!["email".to_string()],
            ..MaskingPolicy::default()
        },
        ..Policy::default()
    };
    let fx = fixture(policy, None).await;

    let response = fx.dispatch("read_records", json!({"connector_id": "csv-users"})).await;
    assert!(!response.is_error);
    let records = response.payload["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["email"], json!("[REDACTED]"));
    assert_eq!(records[0]["name"], json!("A"));
    assert_eq!(records[1]["email"], json!("[REDACTED]"));
    assert_eq!(response.payload["has_more"], json!(false));

    // The decision id in the response is persisted in the audit file.
    let ids = audited_decision_ids(&fx.policy_audit_dir());
    assert!(ids.contains(&response.policy_decision_id.as_str().to_string()));
}

#[tokio::test]
async fn write_requires_matching_approval_token() {
    let policy = Policy {
        writes: WritePolicy {
            mode: WriteGateMode::RequireApproval,
            approval_token_env: Some("WRITE_TOK".to_string()),
            approval_hook: None,
        },
        ..Policy::default()
    };
    let fx = fixture(policy, Some("s3cr3t")).await;

    let denied = fx
        .dispatch(
            "write_records",
            json!({
                "connector_id": "csv-users",
                "records": [{"name": "Z"}],
                "approval_token": "wrong",
            }),
        )
        .await;
    assert!(denied.is_error);
    let message = denied.payload["error"]["message"].as_str().unwrap();
    assert!(message.contains("approval"));

    let approved = fx
        .dispatch(
            "write_records",
            json!({
                "connector_id": "csv-users",
                "records": [{"name": "Z"}],
                "approval_token": "s3cr3t",
            }),
        )
        .await;
    assert!(!approved.is_error, "unexpected error: {:?}", approved.payload);
    assert_eq!(approved.payload["write"]["success"], json!(1));

    // The allow decision records the token approval path.
    let text = fs::read_dir(fx.policy_audit_dir())
        .unwrap()
        .flatten()
        .map(|entry| fs::read_to_string(entry.path()).unwrap())
        .collect::<String>();
    assert!(text.contains("\"write_approved_by\":\"token\""));
}

#[tokio::test]
async fn denied_tools_return_reason_and_are_audited() {
    let policy = Policy {
        deny_tools: vec!["write_records".to_string()],
        ..Policy::default()
    };
    let fx = fixture(policy, None).await;
    let response = fx
        .dispatch(
            "write_records",
            json!({"connector_id": "csv-users", "records": [{"name": "Z"}]}),
        )
        .await;
    assert!(response.is_error);
    assert_eq!(response.payload["error"]["kind"], json!("PERMISSION_DENIED"));
    let reason = response.payload["error"]["message"].as_str().unwrap();
    assert!(!reason.is_empty());
    let ids = audited_decision_ids(&fx.policy_audit_dir());
    assert!(ids.contains(&response.policy_decision_id.as_str().to_string()));
}

#[tokio::test]
async fn csv_formula_write_is_sanitized_on_disk() {
    let fx = fixture(Policy::default(), None).await;
    let response = fx
        .dispatch(
            "write_records",
            json!({"connector_id": "csv-users", "records": [{"name": "=2+2"}]}),
        )
        .await;
    assert!(!response.is_error);

    let on_disk = fs::read_to_string(fx.dir.path().join("users.csv")).unwrap();
    assert!(on_disk.contains("'=2+2"));
    for line in on_disk.lines().skip(1) {
        assert!(!line.starts_with('='));
    }
}

#[tokio::test]
async fn snapshot_tools_round_trip_with_change_detection() {
    let fx = fixture(Policy::default(), None).await;

    let created = fx
        .dispatch(
            "create_snapshot",
            json!({"connector_id": "mem-inventory", "snapshot_id": "baseline"}),
        )
        .await;
    assert!(!created.is_error);

    // Immediately after the snapshot, nothing has changed.
    let unchanged = fx
        .dispatch(
            "detect_changes",
            json!({
                "connector_id": "mem-inventory",
                "snapshot_id": "baseline",
                "key_field": "id",
            }),
        )
        .await;
    assert!(!unchanged.is_error);
    assert_eq!(unchanged.payload["changes"]["total"], json!(0));

    // Mutate the connector, then diff again.
    let write = fx
        .dispatch(
            "write_records",
            json!({
                "connector_id": "mem-inventory",
                "records": [{"id": 1, "v": "x-new"}, {"id": 3, "v": "z"}],
                "mode": "upsert",
            }),
        )
        .await;
    assert!(!write.is_error);

    let changed = fx
        .dispatch(
            "detect_changes",
            json!({
                "connector_id": "mem-inventory",
                "snapshot_id": "baseline",
                "key_field": "id",
            }),
        )
        .await;
    assert!(!changed.is_error);
    let changes = &changed.payload["changes"];
    assert_eq!(changes["added"][0]["key"], json!("3"));
    assert_eq!(changes["modified"][0]["key"], json!("1"));
    assert_eq!(changes["modified"][0]["changed_fields"], json!(["v"]));

    // A fresh-id violation surfaces as SNAPSHOT_EXISTS.
    let duplicate = fx
        .dispatch(
            "create_snapshot",
            json!({"connector_id": "mem-inventory", "snapshot_id": "baseline"}),
        )
        .await;
    assert!(duplicate.is_error);
    assert_eq!(duplicate.payload["error"]["kind"], json!("SNAPSHOT_EXISTS"));

    let listed = fx.dispatch("list_snapshots", json!({})).await;
    assert_eq!(listed.payload["snapshots"].as_array().unwrap().len(), 1);
    let deleted = fx.dispatch("delete_snapshot", json!({"snapshot_id": "baseline"})).await;
    assert!(!deleted.is_error);
}

#[tokio::test]
async fn writes_append_to_the_operation_audit_trail() {
    let fx = fixture(Policy::default(), None).await;
    let write = fx
        .dispatch(
            "write_records",
            json!({
                "connector_id": "mem-inventory",
                "records": [{"id": 9, "v": "new"}],
                "user": "amy",
            }),
        )
        .await;
    assert!(!write.is_error);

    let queried = fx
        .dispatch("query_audit_log", json!({"connector_id": "mem-inventory"}))
        .await;
    assert!(!queried.is_error);
    assert_eq!(queried.payload["audit"]["total"], json!(1));
    assert_eq!(queried.payload["audit"]["create_count"], json!(1));
    assert_eq!(queried.payload["audit"]["entries"][0]["user"], json!("amy"));
    assert_eq!(queried.payload["audit"]["entries"][0]["record_key"], json!("9"));
}

#[tokio::test]
async fn invalid_batch_writes_nothing() {
    let fx = fixture(Policy::default(), None).await;
    // The csv schema infers `id` as required from the seeded rows.
    let response = fx
        .dispatch(
            "write_records",
            json!({
                "connector_id": "csv-users",
                "records": [
                    {"id": 7, "email": "g@x", "name": "G"},
                    {"id": "not-an-integer", "email": "h@x", "name": "H"},
                ],
            }),
        )
        .await;
    assert!(response.is_error);
    assert_eq!(response.payload["error"]["kind"], json!("VALIDATION_ERROR"));

    // Nothing was written and nothing was audited.
    let read = fx.dispatch("read_records", json!({"connector_id": "csv-users"})).await;
    assert_eq!(read.payload["records"].as_array().unwrap().len(), 2);
    let audit = fx
        .dispatch("query_audit_log", json!({"connector_id": "csv-users"}))
        .await;
    assert_eq!(audit.payload["audit"]["total"], json!(0));
}

#[tokio::test]
async fn unknown_tools_and_bad_arguments_are_typed_errors() {
    let fx = fixture(Policy::default(), None).await;
    let unknown = fx.dispatch("drop_all_tables", json!({})).await;
    assert!(unknown.is_error);
    assert_eq!(unknown.payload["error"]["kind"], json!("VALIDATION_ERROR"));

    let bad_args = fx
        .dispatch("read_records", json!({"connector_id": "csv-users", "nope": true}))
        .await;
    assert!(bad_args.is_error);

    let missing = fx.dispatch("read_records", json!({"connector_id": "ghost"})).await;
    assert!(missing.is_error);
    assert_eq!(missing.payload["error"]["kind"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn traceparent_header_is_inherited() {
    let fx = fixture(Policy::default(), None).await;
    let response = fx
        .dispatcher
        .dispatch(DispatchRequest {
            tool: "list_connectors".to_string(),
            arguments: json!({}),
            identity: Identity::default(),
            break_glass: false,
            traceparent: Some(
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
            ),
            remote_ip: None,
        })
        .await;
    assert_eq!(response.trace_id.as_str(), "4bf92f3577b34da6a3ce929d0e0e4736");
}

#[tokio::test]
async fn reconcile_tool_reports_confidence_gating() {
    let fx = fixture(Policy::default(), None).await;
    // Reuse the memory connector against itself: identical sets fully match.
    let response = fx
        .dispatch(
            "reconcile_records",
            json!({
                "source_id": "mem-inventory",
                "target_id": "mem-inventory",
                "rules": [
                    {"name": "id", "source_field": "id", "target_field": "id",
                     "operator": "equals", "weight": 50, "required": true},
                    {"name": "v", "source_field": "v", "target_field": "v",
                     "operator": "equals", "weight": 50},
                ],
            }),
        )
        .await;
    assert!(!response.is_error, "unexpected error: {:?}", response.payload);
    let summary = &response.payload["reconciliation"]["summary"];
    assert_eq!(summary["matched_count"], json!(2));
    assert_eq!(summary["unmatched_source_count"], json!(0));
    assert_eq!(summary["average_confidence"], json!(100.0));
}

#[tokio::test]
async fn compare_tool_masks_nested_report_records() {
    let policy = Policy {
        masking: MaskingPolicy {
            fields: vec!["email".to_string()],
            ..MaskingPolicy::default()
        },
        ..Policy::default()
    };
    let fx = fixture(policy, None).await;
    // Identical sides fully match; the masked payload must not leak emails.
    let response = fx
        .dispatch(
            "compare_records",
            json!({
                "source_id": "csv-users",
                "target_id": "csv-users",
                "mappings": [{"source_field": "name", "target_field": "name"}],
                "source_key": ["id"],
                "target_key": ["id"],
            }),
        )
        .await;
    assert!(!response.is_error);
    assert_eq!(response.payload["comparison"]["summary"]["match_count"], json!(2));
    // No email value survives anywhere in the payload.
    let rendered = response.payload.to_string();
    assert!(!rendered.contains("a@x"));
    assert!(!rendered.contains("b@x"));
}
