// crates/datatrust-core/src/masking.rs
// ============================================================================
// Module: DataTrust Field Masking
// Description: Replace sensitive field values in emitted records.
// Purpose: Apply policy mask-field sets uniformly to every outgoing record.
// Dependencies: serde_json, crate::record
// ============================================================================

//! ## Overview
//! Masking replaces the values of configured fields with a replacement
//! string in every record the dispatcher emits: read results, before/after
//! images in audit queries, and nested records inside comparison, change,
//! and reconciliation reports. Field-name matching is on the trimmed,
//! lowercased name so `" Email "` and `email` mask the same column.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;

use crate::record::Record;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default replacement for masked values.
pub const DEFAULT_REPLACEMENT: &str = "[REDACTED]";

// ============================================================================
// SECTION: Mask Set
// ============================================================================

/// Resolved set of field names to mask, normalized for matching.
///
/// # Invariants
/// - Stored names are trimmed and lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskSet {
    /// Normalized field names.
    fields: BTreeSet<String>,
    /// Replacement value for masked fields.
    replacement: String,
}

impl MaskSet {
    /// Builds a mask set from raw field names and a replacement.
    #[must_use]
    pub fn new<I, S>(fields: I, replacement: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|field| field.as_ref().trim().to_lowercase())
                .filter(|field| !field.is_empty())
                .collect(),
            replacement: replacement.into(),
        }
    }

    /// Returns true when no fields are masked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true when the field name is masked.
    #[must_use]
    pub fn matches(&self, field: &str) -> bool {
        self.fields.contains(&field.trim().to_lowercase())
    }

    /// Returns the replacement value.
    #[must_use]
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Merges another mask set into this one, keeping this replacement.
    pub fn extend(&mut self, other: &Self) {
        for field in &other.fields {
            self.fields.insert(field.clone());
        }
    }

    /// Masks matching fields of a record in place, recursing into nesting.
    pub fn apply(&self, record: &mut Record) {
        if self.is_empty() {
            return;
        }
        for (name, value) in record.iter_mut() {
            if self.matches(name) {
                *value = Value::String(self.replacement.clone());
            } else {
                self.apply_value(value);
            }
        }
    }

    /// Masks matching keys inside nested objects and arrays.
    fn apply_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (name, nested) in map.iter_mut() {
                    if self.matches(name) {
                        *nested = Value::String(self.replacement.clone());
                    } else {
                        self.apply_value(nested);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.apply_value(item);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::DEFAULT_REPLACEMENT;
    use super::MaskSet;
    use crate::record::Record;

    #[test]
    fn masks_trimmed_lowercase_names() {
        let masks = MaskSet::new([" Email "], DEFAULT_REPLACEMENT);
        let mut record = Record::from_value(json!({"email": "a@x", "name": "A"})).unwrap();
        masks.apply(&mut record);
        assert_eq!(record.get("email"), Some(&json!("[REDACTED]")));
        assert_eq!(record.get("name"), Some(&json!("A")));
    }

    #[test]
    fn masks_nested_objects_and_arrays() {
        let masks = MaskSet::new(["ssn"], DEFAULT_REPLACEMENT);
        let mut record = Record::from_value(json!({
            "owner": {"ssn": "123-45-6789"},
            "contacts": [{"ssn": "987-65-4321", "name": "B"}]
        }))
        .unwrap();
        masks.apply(&mut record);
        assert_eq!(record.get_path("owner.ssn"), Some(&json!("[REDACTED]")));
        assert_eq!(
            record.get("contacts").unwrap()[0]["ssn"],
            json!("[REDACTED]")
        );
        assert_eq!(record.get("contacts").unwrap()[0]["name"], json!("B"));
    }

    #[test]
    fn empty_set_is_a_no_op() {
        let masks = MaskSet::default();
        let mut record = Record::from_value(json!({"email": "a@x"})).unwrap();
        masks.apply(&mut record);
        assert_eq!(record.get("email"), Some(&json!("a@x")));
    }
}
