// crates/datatrust-connectors/src/writeops.rs
// ============================================================================
// Module: Write Mode Application
// Description: Apply insert/update/upsert batches to a loaded record set.
// Purpose: Share write semantics between memory and file connectors.
// Dependencies: datatrust-core
// ============================================================================

//! ## Overview
//! Insert appends every record. Update locates an existing record by key
//! field and merges the incoming fields; a missing key or an unmatched key
//! is a per-index failure, not a batch abort. Upsert updates on match and
//! appends otherwise. Key comparison uses the JSON rendering of the key
//! value so `1` and `"1"` stay distinct.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::Record;
use datatrust_core::WriteErrorDetail;
use datatrust_core::WriteMode;
use datatrust_core::WriteResult;

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies a write batch to a loaded record set.
///
/// `key_field` is required for update and upsert; insert ignores it.
#[must_use]
pub fn apply_writes(
    existing: &mut Vec<Record>,
    incoming: &[Record],
    mode: WriteMode,
    key_field: Option<&str>,
) -> WriteResult {
    let mut result = WriteResult::default();
    for (index, record) in incoming.iter().enumerate() {
        match mode {
            WriteMode::Insert => {
                existing.push(record.clone());
                result.success += 1;
            }
            WriteMode::Update | WriteMode::Upsert => {
                let Some(key_field) = key_field else {
                    result.failed += 1;
                    result.errors.push(WriteErrorDetail {
                        index,
                        message: "update requires a configured key field".to_string(),
                    });
                    continue;
                };
                let Some(key) = record.get(key_field) else {
                    result.failed += 1;
                    result.errors.push(WriteErrorDetail {
                        index,
                        message: format!("record is missing key field `{key_field}`"),
                    });
                    continue;
                };
                let position = existing
                    .iter()
                    .position(|candidate| candidate.get(key_field) == Some(key));
                match position {
                    Some(position) => {
                        merge_into(&mut existing[position], record);
                        result.success += 1;
                        result.ids.push(key.to_string());
                    }
                    None if mode == WriteMode::Upsert => {
                        existing.push(record.clone());
                        result.success += 1;
                        result.ids.push(key.to_string());
                    }
                    None => {
                        result.failed += 1;
                        result.errors.push(WriteErrorDetail {
                            index,
                            message: format!("no record matches key `{key}`"),
                        });
                    }
                }
            }
        }
    }
    result
}

/// Merges incoming fields into an existing record.
fn merge_into(target: &mut Record, incoming: &Record) {
    for (field, value) in incoming.iter() {
        // Keys come from an already-validated record envelope.
        let _ = target.insert(field.clone(), value.clone());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::Record;
    use datatrust_core::WriteMode;
    use serde_json::json;

    use super::apply_writes;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn update_merges_matched_and_reports_unmatched() {
        let mut existing = vec![record(json!({"id": 1, "name": "A", "city": "X"}))];
        let incoming = vec![
            record(json!({"id": 1, "name": "A2"})),
            record(json!({"id": 9, "name": "missing"})),
        ];
        let result = apply_writes(&mut existing, &incoming, WriteMode::Update, Some("id"));
        assert_eq!(result.success, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].index, 1);
        assert_eq!(existing[0].get("name"), Some(&json!("A2")));
        assert_eq!(existing[0].get("city"), Some(&json!("X")));
    }

    #[test]
    fn upsert_appends_unmatched_keys() {
        let mut existing = vec![record(json!({"id": 1, "v": "a"}))];
        let incoming = vec![record(json!({"id": 2, "v": "b"}))];
        let result = apply_writes(&mut existing, &incoming, WriteMode::Upsert, Some("id"));
        assert_eq!(result.success, 1);
        assert_eq!(existing.len(), 2);
    }

    #[test]
    fn update_without_key_field_fails_per_record() {
        let mut existing = Vec::new();
        let incoming = vec![record(json!({"id": 1}))];
        let result = apply_writes(&mut existing, &incoming, WriteMode::Update, None);
        assert_eq!(result.failed, 1);
        assert!(result.errors[0].message.contains("key field"));
    }
}
