// crates/datatrust-connectors/src/infer.rs
// ============================================================================
// Module: Schema Inference
// Description: Infer field definitions from observed records.
// Purpose: Give file and memory connectors a schema without declarations.
// Dependencies: datatrust-core, serde_json
// ============================================================================

//! ## Overview
//! Inference scans every record once. A field's type is the most specific
//! type that accepts all its non-null values (integer narrows to number,
//! anything conflicting widens to string). A field is required when it is
//! present and non-null in every record. An empty record set yields a schema
//! with no fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use datatrust_core::FieldDefinition;
use datatrust_core::FieldType;
use datatrust_core::Record;
use datatrust_core::Schema;
use datatrust_core::SchemaOrigin;
use serde_json::Value;

// ============================================================================
// SECTION: Inference
// ============================================================================

/// Per-field accumulator.
#[derive(Debug, Clone)]
struct FieldStats {
    /// Narrowest type accepted so far, `None` before the first non-null value.
    field_type: Option<FieldType>,
    /// Records in which the field appeared non-null.
    present: usize,
    /// Position of first appearance, for stable field ordering.
    first_seen: usize,
}

/// Infers a schema from observed records.
#[must_use]
pub fn infer_schema(name: &str, records: &[Record]) -> Schema {
    let mut stats: BTreeMap<String, FieldStats> = BTreeMap::new();
    for record in records {
        for (field, value) in record.iter() {
            let observed = classify(value);
            let next_index = stats.len();
            let entry = stats.entry(field.clone()).or_insert_with(|| FieldStats {
                field_type: None,
                present: 0,
                first_seen: next_index,
            });
            if let Some(observed) = observed {
                entry.present += 1;
                entry.field_type = Some(match entry.field_type {
                    None => observed,
                    Some(current) => widen(current, observed),
                });
            }
        }
    }

    let mut fields: Vec<(String, FieldStats)> = stats.into_iter().collect();
    fields.sort_by_key(|(_, stat)| stat.first_seen);
    let fields = fields
        .into_iter()
        .map(|(field, stat)| {
            let mut definition =
                FieldDefinition::new(field, stat.field_type.unwrap_or(FieldType::String));
            if !records.is_empty() && stat.present == records.len() {
                definition = definition.required();
            }
            definition
        })
        .collect();
    Schema::new(name, fields, SchemaOrigin::Inferred)
}

/// Classifies a single value; nulls carry no type information.
fn classify(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Number(number) => {
            if number.is_i64() || number.is_u64() {
                Some(FieldType::Integer)
            } else {
                Some(FieldType::Number)
            }
        }
        Value::String(text) => {
            if FieldType::Date.accepts(value) {
                Some(FieldType::Date)
            } else if FieldType::DateTime.accepts(&Value::String(text.clone())) {
                Some(FieldType::DateTime)
            } else {
                Some(FieldType::String)
            }
        }
        Value::Array(_) => Some(FieldType::Array),
        Value::Object(_) => Some(FieldType::Object),
    }
}

/// Widens two observed types to the narrowest common type.
const fn widen(current: FieldType, observed: FieldType) -> FieldType {
    match (current, observed) {
        (FieldType::Integer, FieldType::Integer) => FieldType::Integer,
        (
            FieldType::Integer | FieldType::Number,
            FieldType::Integer | FieldType::Number,
        ) => FieldType::Number,
        (FieldType::Date, FieldType::Date) => FieldType::Date,
        (
            FieldType::Date | FieldType::DateTime,
            FieldType::Date | FieldType::DateTime,
        ) => FieldType::DateTime,
        (FieldType::Boolean, FieldType::Boolean) => FieldType::Boolean,
        (FieldType::Array, FieldType::Array) => FieldType::Array,
        (FieldType::Object, FieldType::Object) => FieldType::Object,
        _ => FieldType::String,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::FieldType;
    use datatrust_core::Record;
    use serde_json::json;

    use super::infer_schema;

    fn records(values: &[serde_json::Value]) -> Vec<Record> {
        values.iter().map(|value| Record::from_value(value.clone()).unwrap()).collect()
    }

    #[test]
    fn empty_set_yields_empty_schema() {
        let schema = infer_schema("empty", &[]);
        assert!(schema.fields.is_empty());
    }

    #[test]
    fn integers_widen_to_number_and_conflicts_to_string() {
        let schema = infer_schema(
            "mixed",
            &records(&[
                json!({"a": 1, "b": 1, "c": "2026-01-01"}),
                json!({"a": 1.5, "b": "x", "c": "2026-01-02T10:00:00Z"}),
            ]),
        );
        assert_eq!(schema.field("a").unwrap().field_type, FieldType::Number);
        assert_eq!(schema.field("b").unwrap().field_type, FieldType::String);
        assert_eq!(schema.field("c").unwrap().field_type, FieldType::DateTime);
    }

    #[test]
    fn required_means_present_and_non_null_everywhere() {
        let schema = infer_schema(
            "req",
            &records(&[
                json!({"id": 1, "note": "x"}),
                json!({"id": 2, "note": null}),
            ]),
        );
        assert!(schema.field("id").unwrap().required);
        assert!(!schema.field("note").unwrap().required);
    }
}
