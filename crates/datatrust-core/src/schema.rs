// crates/datatrust-core/src/schema.rs
// ============================================================================
// Module: DataTrust Schema Model
// Description: Field definitions and schema metadata for connectors.
// Purpose: Provide declared and inferred schemas with a stable wire form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A schema is a named list of field definitions. Connectors either declare
//! schemas (SQL column metadata, SaaS object descriptions) or infer them from
//! observed records (file connectors). Primary keys may be composite.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Field Types
// ============================================================================

/// Value type for a schema field.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Floating-point number.
    Number,
    /// Integral number.
    Integer,
    /// Boolean flag.
    Boolean,
    /// Calendar date (YYYY-MM-DD).
    Date,
    /// Date with time component (RFC3339).
    DateTime,
    /// Ordered list of values.
    Array,
    /// Nested mapping.
    Object,
}

impl FieldType {
    /// Returns a stable label for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Returns true when a JSON value is acceptable for this field type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Date => value.as_str().is_some_and(is_date_literal),
            Self::DateTime => value.as_str().is_some_and(is_datetime_literal),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true for `YYYY-MM-DD` literals.
fn is_date_literal(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    bytes
        .iter()
        .enumerate()
        .all(|(idx, byte)| matches!(idx, 4 | 7) || byte.is_ascii_digit())
}

/// Returns true for RFC3339-shaped date-time literals.
fn is_datetime_literal(value: &str) -> bool {
    value.len() >= 19 && is_date_literal(&value[..10]) && matches!(value.as_bytes()[10], b'T' | b' ')
}

// ============================================================================
// SECTION: Field Definition
// ============================================================================

/// Definition of a single schema field.
///
/// # Invariants
/// - `name` is unique within its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field must be present and non-null.
    #[serde(default)]
    pub required: bool,
    /// Optional human description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the field participates in the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldDefinition {
    /// Creates a field definition with the given name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            description: None,
            primary_key: false,
        }
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as part of the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Provenance of a schema.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaOrigin {
    /// Declared by the backing source or configuration.
    Declared,
    /// Inferred from observed records.
    Inferred,
}

/// Named list of field definitions.
///
/// # Invariants
/// - Field names are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name, typically the entity or file name.
    pub name: String,
    /// Ordered field definitions.
    pub fields: Vec<FieldDefinition>,
    /// How the schema was obtained.
    pub origin: SchemaOrigin,
}

impl Schema {
    /// Creates a schema from a name, fields, and origin.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>, origin: SchemaOrigin) -> Self {
        Self {
            name: name.into(),
            fields,
            origin,
        }
    }

    /// Returns the field definition for a name when present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns the set of field names.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    /// Returns the primary-key field names in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|field| field.primary_key)
            .map(|field| field.name.as_str())
            .collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::FieldDefinition;
    use super::FieldType;
    use super::Schema;
    use super::SchemaOrigin;

    #[test]
    fn field_type_accepts_matching_values() {
        assert!(FieldType::Integer.accepts(&json!(3)));
        assert!(!FieldType::Integer.accepts(&json!(3.5)));
        assert!(FieldType::Date.accepts(&json!("2026-02-01")));
        assert!(!FieldType::Date.accepts(&json!("2026-2-1")));
        assert!(FieldType::DateTime.accepts(&json!("2026-02-01T10:00:00Z")));
    }

    #[test]
    fn composite_primary_key_preserves_order() {
        let schema = Schema::new(
            "orders",
            vec![
                FieldDefinition::new("region", FieldType::String).primary_key(),
                FieldDefinition::new("order_id", FieldType::Integer).primary_key(),
                FieldDefinition::new("amount", FieldType::Number),
            ],
            SchemaOrigin::Declared,
        );
        assert_eq!(schema.primary_key(), vec!["region", "order_id"]);
    }
}
