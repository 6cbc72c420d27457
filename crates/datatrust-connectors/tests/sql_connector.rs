// crates/datatrust-connectors/tests/sql_connector.rs
// ============================================================================
// Module: SQL Connector Tests
// Description: Guard-layer tests over a mock executor.
// Purpose: Ensure injection-shaped input never reaches the driver.
// ============================================================================

//! SQL connector behavior tests with a statement-recording executor.

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

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::FieldDefinition;
use datatrust_core::FieldType;
use datatrust_core::FilterCondition;
use datatrust_core::FilterOperator;
use datatrust_core::FilterOptions;
use datatrust_core::Record;
use datatrust_core::Schema;
use datatrust_core::SchemaOrigin;
use datatrust_core::WriteMode;
use datatrust_connectors::SqlConnector;
use datatrust_connectors::SqlDialect;
use datatrust_connectors::SqlExecutor;
use datatrust_connectors::SqlOptions;
use datatrust_connectors::SqlStatement;
use serde_json::json;

/// Executor that records every statement it receives.
#[derive(Default)]
struct RecordingExecutor {
    /// Statements observed by `query` and `execute`.
    statements: Mutex<Vec<SqlStatement>>,
    /// Schema fetch count.
    schema_fetches: Mutex<u32>,
}

impl RecordingExecutor {
    fn statements(&self) -> Vec<SqlStatement> {
        self.statements.lock().unwrap().clone()
    }

    fn schema_fetches(&self) -> u32 {
        *self.schema_fetches.lock().unwrap()
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn connect(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn fetch_schema(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Schema, ConnectorError> {
        *self.schema_fetches.lock().unwrap() += 1;
        Ok(Schema::new(
            table,
            vec![
                FieldDefinition::new("id", FieldType::Integer).required().primary_key(),
                FieldDefinition::new("amount", FieldType::Number),
            ],
            SchemaOrigin::Declared,
        ))
    }

    async fn query(&self, statement: &SqlStatement) -> Result<Vec<Record>, ConnectorError> {
        self.statements.lock().unwrap().push(statement.clone());
        Ok(Vec::new())
    }

    async fn execute(&self, statement: &SqlStatement) -> Result<u64, ConnectorError> {
        self.statements.lock().unwrap().push(statement.clone());
        Ok(1)
    }
}

fn connector(executor: Arc<RecordingExecutor>) -> SqlConnector {
    SqlConnector::new(
        SqlOptions {
            id: "pg-invoices".to_string(),
            name: "invoices".to_string(),
            readonly: false,
            dialect: SqlDialect::Postgresql,
            table: "invoices".to_string(),
            schema: None,
            key_field: Some("id".to_string()),
        },
        executor,
    )
}

#[tokio::test]
async fn injection_shaped_where_field_executes_zero_statements() {
    let executor = Arc::new(RecordingExecutor::default());
    let sql = connector(Arc::clone(&executor));
    sql.connect().await.unwrap();

    let filter = FilterOptions {
        conditions: vec![FilterCondition::new(
            "id;DROP TABLE users;",
            FilterOperator::Eq,
            json!(1),
        )],
        ..FilterOptions::default()
    };
    let err = sql.read_records(&filter).await.unwrap_err();
    assert_eq!(err.kind, ConnectorErrorKind::ReadFailed);
    // Only the schema lookup ran; no statement reached the driver.
    assert_eq!(executor.schema_fetches(), 1);
    assert!(executor.statements().is_empty());
}

#[tokio::test]
async fn reads_use_bound_parameters_and_cached_schema() {
    let executor = Arc::new(RecordingExecutor::default());
    let sql = connector(Arc::clone(&executor));
    sql.connect().await.unwrap();

    let filter = FilterOptions {
        conditions: vec![FilterCondition::new("id", FilterOperator::Eq, json!(7))],
        ..FilterOptions::default()
    };
    sql.read_records(&filter).await.unwrap();
    sql.read_records(&filter).await.unwrap();

    let statements = executor.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].sql, "SELECT * FROM invoices WHERE id = $1");
    assert_eq!(statements[0].params, vec![json!(7)]);
    // Second read reuses the cached column set.
    assert_eq!(executor.schema_fetches(), 1);
}

#[tokio::test]
async fn cache_clear_forces_schema_refetch() {
    let executor = Arc::new(RecordingExecutor::default());
    let sql = connector(Arc::clone(&executor));
    sql.connect().await.unwrap();

    sql.read_records(&FilterOptions::default()).await.unwrap();
    sql.clear_schema_cache();
    sql.read_records(&FilterOptions::default()).await.unwrap();
    assert_eq!(executor.schema_fetches(), 2);
}

#[tokio::test]
async fn unknown_insert_column_is_a_per_record_failure() {
    let executor = Arc::new(RecordingExecutor::default());
    let sql = connector(Arc::clone(&executor));
    sql.connect().await.unwrap();

    let batch = vec![
        Record::from_value(json!({"id": 1, "amount": 10.0})).unwrap(),
        Record::from_value(json!({"id": 2, "bogus": true})).unwrap(),
    ];
    let result = sql.write_records(&batch, WriteMode::Insert).await.unwrap();
    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].index, 1);
    // Only the valid record produced a statement.
    assert_eq!(executor.statements().len(), 1);
}

#[tokio::test]
async fn validate_rejects_fields_outside_the_schema() {
    let executor = Arc::new(RecordingExecutor::default());
    let sql = connector(Arc::clone(&executor));
    sql.connect().await.unwrap();

    let report = sql
        .validate_records(&[Record::from_value(json!({"id": 1, "ghost": "x"})).unwrap()])
        .await
        .unwrap();
    assert!(!report.valid);
    assert!(report.records[0].errors[0].contains("ghost"));
}
