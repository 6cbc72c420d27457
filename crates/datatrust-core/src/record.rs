// crates/datatrust-core/src/record.rs
// ============================================================================
// Module: DataTrust Record Envelope
// Description: Typed record container with forbidden-key enforcement.
// Purpose: Provide the canonical field mapping used across connectors and tools.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Record`] is an unordered mapping from field name to JSON value. The
//! envelope rejects the keys `__proto__`, `prototype`, and `constructor` at
//! every ingestion point (construction, deserialization, dot-path traversal)
//! so downstream layers never observe them. Nested objects are checked
//! recursively.
//!
//! Security posture: record contents are untrusted input; forbidden keys are
//! rejected rather than dropped so callers see an explicit failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Forbidden Keys
// ============================================================================

/// Field names rejected at every layer to defeat host object-model pollution.
pub const FORBIDDEN_KEYS: &[&str] = &["__proto__", "prototype", "constructor"];

/// Returns true when the field name is forbidden.
#[must_use]
pub fn is_forbidden_key(name: &str) -> bool {
    FORBIDDEN_KEYS.contains(&name)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Error raised when a record contains a forbidden field name.
///
/// # Invariants
/// - `key` is always one of [`FORBIDDEN_KEYS`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("forbidden field name: {key}")]
pub struct ForbiddenKeyError {
    /// Offending field name.
    pub key: String,
}

// ============================================================================
// SECTION: Record Envelope
// ============================================================================

/// Unordered mapping from field name to JSON value.
///
/// # Invariants
/// - No top-level or nested object key is a forbidden name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    /// Field values keyed by field name.
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Builds a record from a field map, rejecting forbidden keys recursively.
    ///
    /// # Errors
    ///
    /// Returns [`ForbiddenKeyError`] when any key at any depth is forbidden.
    pub fn from_fields(fields: BTreeMap<String, Value>) -> Result<Self, ForbiddenKeyError> {
        for (key, value) in &fields {
            check_key(key)?;
            check_value(value)?;
        }
        Ok(Self {
            fields,
        })
    }

    /// Builds a record from a JSON object value.
    ///
    /// # Errors
    ///
    /// Returns [`ForbiddenKeyError`] when any key at any depth is forbidden.
    /// Non-object values produce an empty-key error to keep the failure typed.
    pub fn from_value(value: Value) -> Result<Self, ForbiddenKeyError> {
        let Value::Object(map) = value else {
            return Err(ForbiddenKeyError {
                key: String::new(),
            });
        };
        let mut fields = BTreeMap::new();
        for (key, value) in map {
            check_key(&key)?;
            check_value(&value)?;
            fields.insert(key, value);
        }
        Ok(Self {
            fields,
        })
    }

    /// Inserts a field value, rejecting forbidden keys.
    ///
    /// # Errors
    ///
    /// Returns [`ForbiddenKeyError`] when the key or a nested key is forbidden.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, ForbiddenKeyError> {
        let key = key.into();
        check_key(&key)?;
        check_value(&value)?;
        Ok(self.fields.insert(key, value))
    }

    /// Returns the value for a field when present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        if is_forbidden_key(key) {
            return None;
        }
        self.fields.get(key)
    }

    /// Resolves a dot-separated path against nested objects.
    ///
    /// Traversal stops with `None` on forbidden segments, missing fields, or
    /// non-object intermediate values. Only own keys are consulted.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for segment in segments {
            if is_forbidden_key(segment) {
                return None;
            }
            let Value::Object(map) = current else {
                return None;
            };
            current = map.get(segment)?;
        }
        Some(current)
    }

    /// Removes a field and returns its value when present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Returns true when the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns an iterator over field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns an iterator over field name/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Returns a mutable iterator over field name/value pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.fields.iter_mut()
    }

    /// Consumes the record and returns the underlying field map.
    #[must_use]
    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Renders the record as a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_value().fmt(f)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Validates a single key against the forbidden set.
fn check_key(key: &str) -> Result<(), ForbiddenKeyError> {
    if is_forbidden_key(key) {
        return Err(ForbiddenKeyError {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Recursively validates nested object keys.
fn check_value(value: &Value) -> Result<(), ForbiddenKeyError> {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                check_key(key)?;
                check_value(nested)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check_value(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::Record;
    use super::is_forbidden_key;

    #[test]
    fn rejects_forbidden_top_level_key() {
        let result = Record::from_value(json!({"__proto__": {"x": 1}}));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_forbidden_nested_key() {
        let result = Record::from_value(json!({"a": {"constructor": true}}));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_forbidden_key_inside_array() {
        let result = Record::from_value(json!({"a": [{"prototype": 1}]}));
        assert!(result.is_err());
    }

    #[test]
    fn path_traversal_uses_own_keys_only() {
        let record = Record::from_value(json!({"a": {"b": {"c": 42}}})).unwrap();
        assert_eq!(record.get_path("a.b.c"), Some(&json!(42)));
        assert_eq!(record.get_path("a.b.missing"), None);
        assert_eq!(record.get_path("a.constructor.c"), None);
    }

    #[test]
    fn deserialize_enforces_forbidden_keys() {
        let parsed: Result<Record, _> = serde_json::from_str(r#"{"__proto__": 1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn forbidden_key_set_is_exact() {
        assert!(is_forbidden_key("__proto__"));
        assert!(is_forbidden_key("prototype"));
        assert!(is_forbidden_key("constructor"));
        assert!(!is_forbidden_key("proto"));
    }
}
