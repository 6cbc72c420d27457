// crates/datatrust-connectors/src/sql/connector.rs
// ============================================================================
// Module: SQL Connector
// Description: Guarded connector over a pluggable SQL executor.
// Purpose: Serve reads and writes through validated, parameterized statements.
// Dependencies: async-trait, datatrust-core, crate::sql
// ============================================================================

//! ## Overview
//! The SQL connector composes the statement builder with a driver-backed
//! [`SqlExecutor`]. The table's column set is fetched once and cached;
//! `clear_schema_cache` or `get_schema(true)` refreshes it. Reads fetch one
//! extra row to detect `has_more`; writes run one statement per record so a
//! single bad row surfaces as a per-index error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use datatrust_core::ConnectionState;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::ConnectorInfo;
use datatrust_core::FilterOptions;
use datatrust_core::ReadResult;
use datatrust_core::Record;
use datatrust_core::RecordValidation;
use datatrust_core::Schema;
use datatrust_core::ValidationReport;
use datatrust_core::WriteErrorDetail;
use datatrust_core::WriteMode;
use datatrust_core::WriteResult;

use crate::paging::encode_cursor;
use crate::sql::SqlDialect;
use crate::sql::builder::StatementBuilder;
use crate::sql::executor::SqlExecutor;
use crate::validate::validate_against_schema;

// ============================================================================
// SECTION: Options
// ============================================================================

/// SQL connector options.
#[derive(Debug, Clone)]
pub struct SqlOptions {
    /// Connector identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether writes are rejected.
    pub readonly: bool,
    /// SQL dialect.
    pub dialect: SqlDialect,
    /// Target table name.
    pub table: String,
    /// Optional schema qualifier.
    pub schema: Option<String>,
    /// Key column for update/upsert.
    pub key_field: Option<String>,
}

// ============================================================================
// SECTION: Connector
// ============================================================================

/// Guarded SQL connector over an executor seam.
pub struct SqlConnector {
    /// Options captured at construction.
    options: SqlOptions,
    /// Driver seam.
    executor: Arc<dyn SqlExecutor>,
    /// Cached table schema; `None` until first fetch or after a cache clear.
    schema_cache: Mutex<Option<Schema>>,
    /// Connection state.
    state: Mutex<ConnectionState>,
}

impl SqlConnector {
    /// Creates a SQL connector.
    #[must_use]
    pub fn new(options: SqlOptions, executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            options,
            executor,
            schema_cache: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Clears the cached column set.
    pub fn clear_schema_cache(&self) {
        *self.schema_cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns the cached schema, fetching it on first use.
    async fn cached_schema(&self, force_refresh: bool) -> Result<Schema, ConnectorError> {
        if !force_refresh {
            let cache = self.schema_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(schema) = cache.as_ref() {
                return Ok(schema.clone());
            }
        }
        let schema = self
            .executor
            .fetch_schema(&self.options.table, self.options.schema.as_deref())
            .await
            .map_err(|err| err.with_connector(self.options.id.clone()))?;
        *self.schema_cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(schema.clone());
        Ok(schema)
    }

    /// Builds a statement builder from the cached column set.
    async fn builder(&self) -> Result<StatementBuilder, ConnectorError> {
        let schema = self.cached_schema(false).await?;
        let columns = schema.field_names().into_iter().map(str::to_string).collect();
        StatementBuilder::new(
            self.options.dialect,
            &self.options.table,
            self.options.schema.as_deref(),
            columns,
        )
        .map_err(|err| err.with_connector(self.options.id.clone()))
    }

    /// Fails when the connector is not connected.
    fn require_connected(&self) -> Result<(), ConnectorError> {
        let state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ConnectorError::new(
                ConnectorErrorKind::ConnectionFailed,
                format!("connector `{}` is not connected", self.options.id),
            )
            .with_connector(self.options.id.clone())
            .with_suggestion("call connect before issuing operations"))
        }
    }
}

#[async_trait]
impl Connector for SqlConnector {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: self.options.id.clone(),
            name: self.options.name.clone(),
            connector_type: self.options.dialect.type_tag().to_string(),
            readonly: self.options.readonly,
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        match self.executor.connect().await {
            Ok(()) => {
                *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
                    ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
                    ConnectionState::Error;
                Err(err.with_connector(self.options.id.clone()))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            ConnectionState::Disconnected;
        self.executor.disconnect().await
    }

    async fn get_schema(&self, force_refresh: bool) -> Result<Schema, ConnectorError> {
        self.require_connected()?;
        self.cached_schema(force_refresh).await
    }

    async fn read_records(&self, filter: &FilterOptions) -> Result<ReadResult, ConnectorError> {
        self.require_connected()?;
        let builder = self.builder().await?;
        let plan = builder.select(filter).map_err(|err| err.with_connector(self.options.id.clone()))?;
        let mut rows = self
            .executor
            .query(&plan.statement)
            .await
            .map_err(|err| err.with_connector(self.options.id.clone()))?;

        let has_more = plan
            .limit
            .is_some_and(|limit| rows.len() as u64 > limit);
        if let Some(limit) = plan.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        let next_cursor =
            has_more.then(|| encode_cursor(plan.offset.saturating_add(rows.len() as u64)));
        Ok(ReadResult {
            records: rows,
            total_count: None,
            has_more,
            next_cursor,
        })
    }

    async fn write_records(
        &self,
        records: &[Record],
        mode: WriteMode,
    ) -> Result<WriteResult, ConnectorError> {
        self.require_connected()?;
        if self.options.readonly {
            return Err(ConnectorError::new(
                ConnectorErrorKind::UnsupportedOperation,
                format!("connector `{}` is read-only", self.options.id),
            )
            .with_connector(self.options.id.clone())
            .with_suggestion("target a writable connector or clear the readonly flag"));
        }
        let builder = self.builder().await?;
        let mut result = WriteResult::default();
        for (index, record) in records.iter().enumerate() {
            let statement = match mode {
                WriteMode::Insert => builder.insert(record),
                WriteMode::Update => {
                    let Some(key) = self.options.key_field.as_deref() else {
                        result.failed += 1;
                        result.errors.push(WriteErrorDetail {
                            index,
                            message: "update requires a configured key field".to_string(),
                        });
                        continue;
                    };
                    builder.update(record, key)
                }
                WriteMode::Upsert => {
                    // Update first; fall back to insert when no row matched.
                    let Some(key) = self.options.key_field.as_deref() else {
                        result.failed += 1;
                        result.errors.push(WriteErrorDetail {
                            index,
                            message: "upsert requires a configured key field".to_string(),
                        });
                        continue;
                    };
                    match builder.update(record, key) {
                        Ok(update) => {
                            match self.executor.execute(&update).await {
                                Ok(0) => builder.insert(record),
                                Ok(_) => {
                                    result.success += 1;
                                    continue;
                                }
                                Err(err) => {
                                    result.failed += 1;
                                    result.errors.push(WriteErrorDetail {
                                        index,
                                        message: err.message,
                                    });
                                    continue;
                                }
                            }
                        }
                        Err(err) => Err(err),
                    }
                }
            };
            match statement {
                Ok(statement) => match self.executor.execute(&statement).await {
                    Ok(_) => result.success += 1,
                    Err(err) => {
                        result.failed += 1;
                        result.errors.push(WriteErrorDetail {
                            index,
                            message: err.message,
                        });
                    }
                },
                Err(err) => {
                    result.failed += 1;
                    result.errors.push(WriteErrorDetail {
                        index,
                        message: err.message,
                    });
                }
            }
        }
        Ok(result)
    }

    async fn validate_records(
        &self,
        records: &[Record],
    ) -> Result<ValidationReport, ConnectorError> {
        self.require_connected()?;
        let schema = self.cached_schema(false).await?;
        let validations: Vec<RecordValidation> = records
            .iter()
            .enumerate()
            .map(|(index, record)| validate_against_schema(index, record, &schema, true))
            .collect();
        Ok(ValidationReport::from_records(validations))
    }

    async fn test_connection(&self) -> Result<(), ConnectorError> {
        self.executor.ping().await.map_err(|err| err.with_connector(self.options.id.clone()))
    }
}
