// crates/datatrust-connectors/src/sql/executor.rs
// ============================================================================
// Module: SQL Executor Seam
// Description: Driver-facing trait the SQL connector is generic over.
// Purpose: Keep vendor drivers out of the core while pinning their contract.
// Dependencies: async-trait, datatrust-core
// ============================================================================

//! ## Overview
//! A [`SqlExecutor`] adapts one driver (PostgreSQL, MySQL) to the guard
//! layer. The connector hands it fully built statements whose literal values
//! are bound parameters; the executor must never interpolate them. Schema
//! fetches return declared column definitions used for identifier
//! membership checks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use datatrust_core::ConnectorError;
use datatrust_core::Record;
use datatrust_core::Schema;
use serde_json::Value;

// ============================================================================
// SECTION: Statements
// ============================================================================

/// A statement with positional bound parameters.
///
/// # Invariants
/// - `sql` references parameters only through dialect placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Statement text with placeholders.
    pub sql: String,
    /// Positional parameter values.
    pub params: Vec<Value>,
}

// ============================================================================
// SECTION: Executor Trait
// ============================================================================

/// Driver seam for SQL-backed connectors.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Opens the underlying connection or pool.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the database is unreachable or
    /// rejects the configured credentials.
    async fn connect(&self) -> Result<(), ConnectorError>;

    /// Closes the underlying connection or pool.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when teardown fails.
    async fn disconnect(&self) -> Result<(), ConnectorError>;

    /// Probes connectivity.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the probe fails.
    async fn ping(&self) -> Result<(), ConnectorError>;

    /// Fetches declared column definitions for a table.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the table metadata cannot be read.
    async fn fetch_schema(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Schema, ConnectorError>;

    /// Runs a row-returning statement.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the statement fails.
    async fn query(&self, statement: &SqlStatement) -> Result<Vec<Record>, ConnectorError>;

    /// Runs a row-count-returning statement.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the statement fails.
    async fn execute(&self, statement: &SqlStatement) -> Result<u64, ConnectorError>;
}
