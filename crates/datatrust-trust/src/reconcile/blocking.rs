// crates/datatrust-trust/src/reconcile/blocking.rs
// ============================================================================
// Module: Reconciliation Blocking
// Description: Candidate bucketing to avoid full cross-product matching.
// Purpose: Cut rule evaluations by grouping records on a cheap key.
// Dependencies: serde, crate::reconcile::similarity
// ============================================================================

//! ## Overview
//! Blocking buckets target records under a cheap key before the full rule
//! set runs. Auto mode derives the key from the required `equals` rules
//! (composite keys joined by the unit separator, per-rule case sensitivity
//! honoured); configured mode uses one field pair with an explicit
//! algorithm; off compares the full cross-product. Keys are capped at 256
//! characters. In configured mode an empty bucket falls back to a full scan
//! for that source row; in auto mode an empty bucket is final, since a
//! required equals rule could never match outside it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::Record;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::reconcile::similarity::cologne_phonetic;
use crate::reconcile::similarity::soundex;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Maximum blocking key length in characters.
pub const BLOCKING_KEY_CAP: usize = 256;

/// Separator joining composite auto-key segments.
pub const COMPOSITE_SEPARATOR: char = '\u{1F}';

/// Key derivation algorithm for configured blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "algorithm")]
pub enum BlockingAlgorithm {
    /// Exact value.
    Exact,
    /// Fixed-length prefix.
    Prefix {
        /// Prefix length in characters.
        length: usize,
    },
    /// Cologne Phonetic code.
    ColognePhonetic,
    /// Soundex code.
    Soundex,
}

/// Blocking mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum BlockingConfig {
    /// Derive the key from required equals rules.
    #[default]
    Auto,
    /// Explicit field pair and algorithm.
    Configured {
        /// Source-side key field.
        source_field: String,
        /// Target-side key field.
        target_field: String,
        /// Key derivation algorithm.
        #[serde(flatten)]
        algorithm: BlockingAlgorithm,
    },
    /// Full cross-product.
    Off,
}

/// One auto-derived key segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoKeyField {
    /// Source-side field.
    pub source_field: String,
    /// Target-side field.
    pub target_field: String,
    /// Whether the originating rule compares case-insensitively.
    pub case_insensitive: bool,
}

// ============================================================================
// SECTION: Key Derivation
// ============================================================================

/// Builds the auto-blocking key for one record side.
///
/// Returns `None` when any segment value is missing or null; a required
/// equals rule could never match such a record.
#[must_use]
pub fn auto_key(record: &Record, fields: &[AutoKeyField], source_side: bool) -> Option<String> {
    let mut key = String::new();
    for (index, field) in fields.iter().enumerate() {
        let name = if source_side { &field.source_field } else { &field.target_field };
        let value = record.get(name)?;
        if value.is_null() {
            return None;
        }
        if index > 0 {
            key.push(COMPOSITE_SEPARATOR);
        }
        let rendered = render(value);
        if field.case_insensitive {
            key.push_str(&rendered.to_lowercase());
        } else {
            key.push_str(&rendered);
        }
    }
    Some(cap(key))
}

/// Builds a configured-blocking key from one value.
#[must_use]
pub fn configured_key(value: &Value, algorithm: BlockingAlgorithm) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let rendered = render(value);
    let key = match algorithm {
        BlockingAlgorithm::Exact => rendered,
        BlockingAlgorithm::Prefix {
            length,
        } => rendered.chars().take(length.max(1)).collect(),
        BlockingAlgorithm::ColognePhonetic => cologne_phonetic(&rendered),
        BlockingAlgorithm::Soundex => soundex(&rendered),
    };
    Some(cap(key))
}

/// Renders a value as key text.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Caps a key at the maximum length.
fn cap(key: String) -> String {
    if key.chars().count() <= BLOCKING_KEY_CAP {
        key
    } else {
        key.chars().take(BLOCKING_KEY_CAP).collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::Record;
    use serde_json::json;

    use super::AutoKeyField;
    use super::BLOCKING_KEY_CAP;
    use super::BlockingAlgorithm;
    use super::auto_key;
    use super::configured_key;

    #[test]
    fn auto_key_joins_segments_with_unit_separator() {
        let record = Record::from_value(json!({"region": "EU", "id": 7})).unwrap();
        let fields = vec![
            AutoKeyField {
                source_field: "region".to_string(),
                target_field: "zone".to_string(),
                case_insensitive: true,
            },
            AutoKeyField {
                source_field: "id".to_string(),
                target_field: "id".to_string(),
                case_insensitive: false,
            },
        ];
        let key = auto_key(&record, &fields, true).unwrap();
        assert_eq!(key, format!("eu{}7", super::COMPOSITE_SEPARATOR));
    }

    #[test]
    fn missing_segment_yields_no_key() {
        let record = Record::from_value(json!({"id": 7})).unwrap();
        let fields = vec![AutoKeyField {
            source_field: "region".to_string(),
            target_field: "zone".to_string(),
            case_insensitive: false,
        }];
        assert!(auto_key(&record, &fields, true).is_none());
    }

    #[test]
    fn configured_algorithms_derive_expected_keys() {
        assert_eq!(
            configured_key(&json!("Meier"), BlockingAlgorithm::Soundex).unwrap(),
            "M600"
        );
        assert_eq!(
            configured_key(&json!("Smithson"), BlockingAlgorithm::Prefix {
                length: 4
            })
            .unwrap(),
            "Smit"
        );
    }

    #[test]
    fn keys_are_capped() {
        let long = "x".repeat(1_000);
        let key = configured_key(&json!(long), BlockingAlgorithm::Exact).unwrap();
        assert_eq!(key.chars().count(), BLOCKING_KEY_CAP);
    }
}
