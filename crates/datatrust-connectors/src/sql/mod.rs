// crates/datatrust-connectors/src/sql/mod.rs
// ============================================================================
// Module: SQL Guard Layer
// Description: Identifier validation and dialect rules for SQL connectors.
// Purpose: Keep every generated statement injection-free by construction.
// Dependencies: datatrust-core
// ============================================================================

//! ## Overview
//! SQL connectors never interpolate caller data into statements. Identifiers
//! (table, schema, column) must match `^[A-Za-z_][A-Za-z0-9_]*$` and, for
//! columns, appear in the cached column set fetched from the live schema;
//! violations fail with `READ_FAILED` before any statement is issued. All
//! literal values travel as bound parameters in the dialect's placeholder
//! style. The concrete driver plugs in behind [`executor::SqlExecutor`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod builder;
pub mod connector;
pub mod executor;

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Dialects
// ============================================================================

/// Supported SQL dialects.
///
/// # Invariants
/// - Variants are stable for serialization and config matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    /// PostgreSQL (`$1` placeholders).
    Postgresql,
    /// MySQL (`?` placeholders).
    Mysql,
}

impl SqlDialect {
    /// Returns the connector type tag for this dialect.
    #[must_use]
    pub const fn type_tag(self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
        }
    }

    /// Renders the placeholder for a 1-based parameter index.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgresql => format!("${index}"),
            Self::Mysql => "?".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Identifier Guard
// ============================================================================

/// Returns true when the name is a safe SQL identifier.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Validates an identifier, failing with `READ_FAILED` before any statement.
///
/// # Errors
///
/// Returns a `READ_FAILED` error naming the offending identifier.
pub fn require_identifier(kind: &str, name: &str) -> Result<(), ConnectorError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(ConnectorError::new(
            ConnectorErrorKind::ReadFailed,
            format!("{kind} `{name}` is not a valid sql identifier"),
        )
        .with_suggestion("identifiers must match ^[A-Za-z_][A-Za-z0-9_]*$"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
