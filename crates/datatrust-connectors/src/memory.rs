// crates/datatrust-connectors/src/memory.rs
// ============================================================================
// Module: Memory Connector
// Description: In-process connector backed by a record vector.
// Purpose: Serve tests, demos, and the `memory` configuration type.
// Dependencies: async-trait, datatrust-core, crate::{infer, paging, writeops}
// ============================================================================

//! ## Overview
//! The memory connector holds its records behind a mutex and implements the
//! full contract: filters, projection, ordering, offset and cursor
//! pagination, all three write modes, schema inference, and validation. It
//! is the reference implementation the governance and dispatch layers are
//! tested against.

// ============================================================================
// SECTION: Imports
// ============================================================================

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
use datatrust_core::WriteMode;
use datatrust_core::WriteResult;

use crate::infer::infer_schema;
use crate::paging::page_records;
use crate::validate::validate_against_schema;
use crate::writeops::apply_writes;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Memory connector options.
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Connector identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether writes are rejected.
    pub readonly: bool,
    /// Key field for update/upsert matching.
    pub key_field: Option<String>,
    /// Initial records.
    pub seed: Vec<Record>,
}

// ============================================================================
// SECTION: Connector
// ============================================================================

/// In-process connector backed by a record vector.
pub struct MemoryConnector {
    /// Options captured at construction.
    options: MemoryOptions,
    /// Record store.
    records: Mutex<Vec<Record>>,
    /// Connection state.
    state: Mutex<ConnectionState>,
}

impl MemoryConnector {
    /// Creates a memory connector from options.
    #[must_use]
    pub fn new(options: MemoryOptions) -> Self {
        let seed = options.seed.clone();
        Self {
            options,
            records: Mutex::new(seed),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Returns a copy of the current records.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fails with `CONNECTOR_NOT_CONNECTED` semantics when disconnected.
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
impl Connector for MemoryConnector {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: self.options.id.clone(),
            name: self.options.name.clone(),
            connector_type: "memory".to_string(),
            readonly: self.options.readonly,
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Connected;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Disconnected;
        Ok(())
    }

    async fn get_schema(&self, _force_refresh: bool) -> Result<Schema, ConnectorError> {
        self.require_connected()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(infer_schema(&self.options.name, &records))
    }

    async fn read_records(&self, filter: &FilterOptions) -> Result<ReadResult, ConnectorError> {
        self.require_connected()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner).clone();
        page_records(records, filter).map_err(|err| err.with_connector(self.options.id.clone()))
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
        let mut store = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(apply_writes(&mut store, records, mode, self.options.key_field.as_deref()))
    }

    async fn validate_records(
        &self,
        records: &[Record],
    ) -> Result<ValidationReport, ConnectorError> {
        self.require_connected()?;
        let schema = {
            let store = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            infer_schema(&self.options.name, &store)
        };
        let validations: Vec<RecordValidation> = records
            .iter()
            .enumerate()
            .map(|(index, record)| validate_against_schema(index, record, &schema, false))
            .collect();
        Ok(ValidationReport::from_records(validations))
    }

    async fn test_connection(&self) -> Result<(), ConnectorError> {
        self.require_connected()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::Connector;
    use datatrust_core::ConnectorErrorKind;
    use datatrust_core::FilterOptions;
    use datatrust_core::Record;
    use datatrust_core::WriteMode;
    use serde_json::json;

    use super::MemoryConnector;
    use super::MemoryOptions;

    fn seeded(readonly: bool) -> MemoryConnector {
        MemoryConnector::new(MemoryOptions {
            id: "mem-1".to_string(),
            name: "Memory".to_string(),
            readonly,
            key_field: Some("id".to_string()),
            seed: vec![
                Record::from_value(json!({"id": 1, "name": "A"})).unwrap(),
                Record::from_value(json!({"id": 2, "name": "B"})).unwrap(),
            ],
        })
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let connector = seeded(false);
        let err = connector.read_records(&FilterOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, ConnectorErrorKind::ConnectionFailed);
        connector.connect().await.unwrap();
        assert!(connector.read_records(&FilterOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn readonly_rejects_writes_with_unsupported_operation() {
        let connector = seeded(true);
        connector.connect().await.unwrap();
        let err = connector
            .write_records(&[Record::from_value(json!({"id": 3})).unwrap()], WriteMode::Insert)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ConnectorErrorKind::UnsupportedOperation);
    }

    #[tokio::test]
    async fn upsert_round_trip() {
        let connector = seeded(false);
        connector.connect().await.unwrap();
        let batch = vec![
            Record::from_value(json!({"id": 2, "name": "B2"})).unwrap(),
            Record::from_value(json!({"id": 3, "name": "C"})).unwrap(),
        ];
        let result = connector.write_records(&batch, WriteMode::Upsert).await.unwrap();
        assert_eq!(result.success, 2);
        let all = connector.read_records(&FilterOptions::default()).await.unwrap();
        assert_eq!(all.records.len(), 3);
    }
}
