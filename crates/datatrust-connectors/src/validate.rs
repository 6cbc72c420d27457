// crates/datatrust-connectors/src/validate.rs
// ============================================================================
// Module: Record Validation
// Description: Validate records against declared or inferred schemas.
// Purpose: Share validation semantics across every connector.
// Dependencies: datatrust-core
// ============================================================================

//! ## Overview
//! A record is valid when every required field is present and non-null and
//! every present field's value is accepted by the field's declared type.
//! Required flags are enforced only for declared schemas; an inferred
//! schema's required flag is an observation about existing data, not a
//! constraint on new records. Connectors with authoritative schemas
//! additionally reject fields that do not appear in the schema at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::Record;
use datatrust_core::RecordValidation;
use datatrust_core::Schema;
use datatrust_core::SchemaOrigin;
use serde_json::Value;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates one record against a schema.
#[must_use]
pub fn validate_against_schema(
    index: usize,
    record: &Record,
    schema: &Schema,
    reject_unknown: bool,
) -> RecordValidation {
    let mut errors = Vec::new();

    for field in &schema.fields {
        match record.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required && schema.origin == SchemaOrigin::Declared {
                    errors.push(format!("required field `{}` is missing or null", field.name));
                }
            }
            Some(value) => {
                if !field.field_type.accepts(value) {
                    errors.push(format!(
                        "field `{}` expects {} but got {}",
                        field.name,
                        field.field_type,
                        value_kind(value)
                    ));
                }
            }
        }
    }

    if reject_unknown {
        let known = schema.field_names();
        for name in record.field_names() {
            if !known.contains(name) {
                errors.push(format!("field `{name}` is not present in the schema"));
            }
        }
    }

    RecordValidation {
        index,
        valid: errors.is_empty(),
        errors,
    }
}

/// Returns a human label for a JSON value kind.
fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::FieldDefinition;
    use datatrust_core::FieldType;
    use datatrust_core::Record;
    use datatrust_core::Schema;
    use datatrust_core::SchemaOrigin;
    use serde_json::json;

    use super::validate_against_schema;

    fn schema() -> Schema {
        Schema::new(
            "users",
            vec![
                FieldDefinition::new("id", FieldType::Integer).required(),
                FieldDefinition::new("email", FieldType::String),
            ],
            SchemaOrigin::Declared,
        )
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let record = Record::from_value(json!({"email": "a@x"})).unwrap();
        let outcome = validate_against_schema(0, &record, &schema(), false);
        assert!(!outcome.valid);
        assert!(outcome.errors[0].contains("id"));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let record = Record::from_value(json!({"id": "not-a-number"})).unwrap();
        let outcome = validate_against_schema(0, &record, &schema(), false);
        assert!(!outcome.valid);
        assert!(outcome.errors[0].contains("integer"));
    }

    #[test]
    fn unknown_fields_rejected_only_in_strict_mode() {
        let record = Record::from_value(json!({"id": 1, "extra": true})).unwrap();
        assert!(validate_against_schema(0, &record, &schema(), false).valid);
        let strict = validate_against_schema(0, &record, &schema(), true);
        assert!(!strict.valid);
        assert!(strict.errors[0].contains("extra"));
    }
}
