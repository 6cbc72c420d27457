// crates/datatrust-connectors/src/file/json.rs
// ============================================================================
// Module: JSON Format Adapter
// Description: JSON parse/serialize with nested records-path support.
// Purpose: Read record arrays from JSON documents and write them back.
// Dependencies: serde_json, datatrust-core
// ============================================================================

//! ## Overview
//! A JSON source is either a top-level array of records or a document whose
//! record array sits at a dot-separated `records_path`. Path segments equal
//! to a forbidden record key are rejected at construction with
//! `CONFIGURATION_ERROR`, and traversal uses own-property lookup only.
//! Writes patch the record array back into the surrounding document so the
//! rest of the file survives a rewrite.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::Record;
use datatrust_core::record::is_forbidden_key;
use serde_json::Map;
use serde_json::Value;

use crate::file::FileFormat;

// ============================================================================
// SECTION: Format
// ============================================================================

/// JSON format options.
#[derive(Debug, Clone, Default)]
pub struct JsonFormat {
    /// Dot-separated path to the record array; `None` means top-level array.
    records_path: Option<Vec<String>>,
    /// Whether to pretty-print on write.
    pub pretty: bool,
}

impl JsonFormat {
    /// Creates a JSON format, validating the records path.
    ///
    /// # Errors
    ///
    /// Returns `CONFIGURATION_ERROR` when a path segment is empty or equals
    /// a forbidden record key.
    pub fn new(records_path: Option<&str>, pretty: bool) -> Result<Self, ConnectorError> {
        let records_path = match records_path {
            None => None,
            Some(path) => {
                let segments: Vec<String> = path.split('.').map(str::to_string).collect();
                for segment in &segments {
                    if segment.is_empty() {
                        return Err(ConnectorError::new(
                            ConnectorErrorKind::ConfigurationError,
                            format!("records_path `{path}` contains an empty segment"),
                        )
                        .with_suggestion("use dot-separated non-empty segments"));
                    }
                    if is_forbidden_key(segment) {
                        return Err(ConnectorError::new(
                            ConnectorErrorKind::ConfigurationError,
                            format!("records_path segment `{segment}` is a forbidden field name"),
                        )
                        .with_suggestion("rename the containing object key in the source file"));
                    }
                }
                Some(segments)
            }
        };
        Ok(Self {
            records_path,
            pretty,
        })
    }

    /// Resolves the record array inside a parsed document.
    fn resolve<'a>(&self, document: &'a Value) -> Result<&'a Vec<Value>, ConnectorError> {
        let mut current = document;
        if let Some(path) = &self.records_path {
            for segment in path {
                let Value::Object(map) = current else {
                    return Err(path_error(path, "an intermediate value is not an object"));
                };
                current = map
                    .get(segment)
                    .ok_or_else(|| path_error(path, &format!("segment `{segment}` is missing")))?;
            }
        }
        match current {
            Value::Array(items) => Ok(items),
            _ => Err(ConnectorError::new(
                ConnectorErrorKind::ReadFailed,
                "json records location does not hold an array",
            )
            .with_suggestion("point records_path at an array of objects")),
        }
    }

    /// Patches the record array back into the surrounding document.
    fn embed(&self, previous: Option<&[u8]>, records_value: Value) -> Result<Value, ConnectorError> {
        let Some(path) = &self.records_path else {
            return Ok(records_value);
        };
        let mut document = match previous {
            Some(bytes) if !bytes.is_empty() => parse_document(bytes)?,
            _ => Value::Object(Map::new()),
        };
        let mut current = &mut document;
        for segment in path {
            let Value::Object(map) = current else {
                return Err(path_error(path, "an intermediate value is not an object"));
            };
            current = map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
        }
        *current = records_value;
        Ok(document)
    }
}

/// Builds a read failure for a records-path problem.
fn path_error(path: &[String], detail: &str) -> ConnectorError {
    ConnectorError::new(
        ConnectorErrorKind::ReadFailed,
        format!("records_path `{}` cannot be resolved: {detail}", path.join(".")),
    )
    .with_suggestion("check the records_path against the document layout")
}

/// Parses raw bytes into a JSON document.
fn parse_document(bytes: &[u8]) -> Result<Value, ConnectorError> {
    serde_json::from_slice(bytes).map_err(|err| {
        ConnectorError::new(
            ConnectorErrorKind::ReadFailed,
            format!("invalid json document: {err}"),
        )
        .with_suggestion("fix the document syntax or regenerate the file")
    })
}

impl FileFormat for JsonFormat {
    fn type_tag(&self) -> &'static str {
        "json"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<Record>, ConnectorError> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let document = parse_document(bytes)?;
        let items = self.resolve(&document)?;
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let record = Record::from_value(item.clone()).map_err(|err| {
                ConnectorError::new(ConnectorErrorKind::ReadFailed, err.to_string())
                    .with_suggestion("remove forbidden field names from the source records")
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn serialize(
        &self,
        previous: Option<&[u8]>,
        records: &[Record],
    ) -> Result<Vec<u8>, ConnectorError> {
        let array = Value::Array(records.iter().map(Record::to_value).collect());
        let document = self.embed(previous, array)?;
        let rendered = if self.pretty {
            serde_json::to_vec_pretty(&document)
        } else {
            serde_json::to_vec(&document)
        };
        rendered.map_err(|err| {
            ConnectorError::new(
                ConnectorErrorKind::WriteFailed,
                format!("failed to serialize json: {err}"),
            )
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::ConnectorErrorKind;
    use datatrust_core::Record;
    use serde_json::json;

    use super::JsonFormat;
    use crate::file::FileFormat;

    #[test]
    fn forbidden_path_segment_is_a_configuration_error() {
        let err = JsonFormat::new(Some("data.__proto__.items"), false).unwrap_err();
        assert_eq!(err.kind, ConnectorErrorKind::ConfigurationError);
    }

    #[test]
    fn top_level_array_round_trip() {
        let format = JsonFormat::new(None, false).unwrap();
        let records = vec![
            Record::from_value(json!({"id": 1, "name": "Ada"})).unwrap(),
            Record::from_value(json!({"id": 2, "name": "Grace"})).unwrap(),
        ];
        let bytes = format.serialize(None, &records).unwrap();
        assert_eq!(format.parse(&bytes).unwrap(), records);
    }

    #[test]
    fn records_path_preserves_surrounding_document() {
        let format = JsonFormat::new(Some("data.users"), false).unwrap();
        let original = serde_json::to_vec(&json!({
            "version": 3,
            "data": {"users": [{"id": 1}], "other": true}
        }))
        .unwrap();
        let parsed = format.parse(&original).unwrap();
        assert_eq!(parsed.len(), 1);

        let updated = vec![Record::from_value(json!({"id": 1})).unwrap(),
            Record::from_value(json!({"id": 2})).unwrap()];
        let bytes = format.serialize(Some(&original), &updated).unwrap();
        let document: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(document["version"], json!(3));
        assert_eq!(document["data"]["other"], json!(true));
        assert_eq!(document["data"]["users"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn forbidden_record_key_fails_read() {
        let format = JsonFormat::new(None, false).unwrap();
        let err = format.parse(br#"[{"constructor": 1}]"#).unwrap_err();
        assert_eq!(err.kind, ConnectorErrorKind::ReadFailed);
    }

    #[test]
    fn non_array_location_is_rejected() {
        let format = JsonFormat::new(Some("data"), false).unwrap();
        let err = format.parse(br#"{"data": {"not": "array"}}"#).unwrap_err();
        assert_eq!(err.kind, ConnectorErrorKind::ReadFailed);
    }
}
