// crates/datatrust-connectors/src/file/csv.rs
// ============================================================================
// Module: CSV Format Adapter
// Description: CSV parse/serialize with formula sanitization.
// Purpose: Read headered CSV into records and write records back safely.
// Dependencies: csv, datatrust-core
// ============================================================================

//! ## Overview
//! Parsing reads a headered CSV and coerces cell text into booleans,
//! integers, numbers, or strings; empty cells become null. Header names
//! matching the forbidden record keys fail with `SCHEMA_MISMATCH`. On the
//! write side, any string cell whose first non-blank character is `=`, `+`,
//! `-`, or `@` is prefixed with the configured escape character so exported
//! files cannot smuggle spreadsheet formulas.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::Record;
use datatrust_core::record::is_forbidden_key;
use serde_json::Value;

use crate::file::FileFormat;

// ============================================================================
// SECTION: Options
// ============================================================================

/// CSV format options.
#[derive(Debug, Clone)]
pub struct CsvFormat {
    /// Field delimiter.
    pub delimiter: u8,
    /// Whether to escape leading formula characters on write.
    pub sanitize_formulas: bool,
    /// Escape character prefixed to formula-shaped cells.
    pub escape_char: char,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            sanitize_formulas: true,
            escape_char: '\'',
        }
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

impl CsvFormat {
    /// Coerces CSV cell text into a typed JSON value.
    fn coerce(cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match cell {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(int) = cell.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Ok(float) = cell.parse::<f64>()
            && let Some(number) = serde_json::Number::from_f64(float)
        {
            return Value::Number(number);
        }
        Value::String(cell.to_string())
    }

    /// Renders a JSON value as CSV cell text, sanitizing formulas.
    fn render(&self, value: &Value) -> String {
        let text = match value {
            Value::Null => String::new(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => number.to_string(),
            Value::String(text) => text.clone(),
            Value::Array(_) | Value::Object(_) => value.to_string(),
        };
        if self.sanitize_formulas && matches!(value, Value::String(_)) && is_formula_shaped(&text)
        {
            let mut escaped = String::with_capacity(text.len() + 1);
            escaped.push(self.escape_char);
            escaped.push_str(&text);
            escaped
        } else {
            text
        }
    }
}

/// Returns true when a cell would be interpreted as a spreadsheet formula.
///
/// Matches a leading run of blank characters (tab, CR, LF, space) followed
/// by `=`, `+`, `-`, or `@`.
#[must_use]
pub fn is_formula_shaped(cell: &str) -> bool {
    let trimmed = cell.trim_start_matches(['\t', '\r', '\n', ' ']);
    trimmed.starts_with(['=', '+', '-', '@'])
}

impl FileFormat for CsvFormat {
    fn type_tag(&self) -> &'static str {
        "csv"
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<Record>, ConnectorError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|err| {
                ConnectorError::new(
                    ConnectorErrorKind::ReadFailed,
                    format!("failed to read csv headers: {err}"),
                )
                .with_suggestion("check the delimiter configuration and file encoding")
            })?
            .clone();
        for header in &headers {
            if is_forbidden_key(header) {
                return Err(ConnectorError::new(
                    ConnectorErrorKind::SchemaMismatch,
                    format!("csv header `{header}` is a forbidden field name"),
                )
                .with_suggestion("rename the offending column in the source file"));
            }
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|err| {
                ConnectorError::new(
                    ConnectorErrorKind::ReadFailed,
                    format!("failed to read csv row: {err}"),
                )
                .with_suggestion("check the file for unbalanced quotes or stray delimiters")
            })?;
            let mut record = Record::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                record.insert(header.to_string(), Self::coerce(cell)).map_err(|err| {
                    ConnectorError::new(ConnectorErrorKind::SchemaMismatch, err.to_string())
                })?;
            }
            records.push(record);
        }
        Ok(records)
    }

    fn serialize(
        &self,
        _previous: Option<&[u8]>,
        records: &[Record],
    ) -> Result<Vec<u8>, ConnectorError> {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for field in record.field_names() {
                if !columns.iter().any(|column| column == field) {
                    columns.push(field.to_string());
                }
            }
        }

        let mut writer =
            csv::WriterBuilder::new().delimiter(self.delimiter).from_writer(Vec::new());
        let failure = |err: csv::Error| {
            ConnectorError::new(
                ConnectorErrorKind::WriteFailed,
                format!("failed to serialize csv: {err}"),
            )
        };
        writer.write_record(&columns).map_err(failure)?;
        for record in records {
            let row: Vec<String> = columns
                .iter()
                .map(|column| record.get(column).map_or_else(String::new, |v| self.render(v)))
                .collect();
            writer.write_record(&row).map_err(failure)?;
        }
        writer.into_inner().map_err(|err| {
            ConnectorError::new(
                ConnectorErrorKind::WriteFailed,
                format!("failed to flush csv writer: {err}"),
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

    use datatrust_core::Record;
    use serde_json::json;

    use super::CsvFormat;
    use super::is_formula_shaped;
    use crate::file::FileFormat;

    #[test]
    fn empty_input_yields_zero_records() {
        let format = CsvFormat::default();
        assert!(format.parse(b"").unwrap().is_empty());
    }

    #[test]
    fn parse_coerces_simple_types() {
        let format = CsvFormat::default();
        let records = format.parse(b"id,name,active,score\n1,Ada,true,9.5\n").unwrap();
        assert_eq!(records[0].get("id"), Some(&json!(1)));
        assert_eq!(records[0].get("active"), Some(&json!(true)));
        assert_eq!(records[0].get("score"), Some(&json!(9.5)));
        assert_eq!(records[0].get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn forbidden_header_fails_schema_mismatch() {
        let format = CsvFormat::default();
        let err = format.parse(b"__proto__,x\n1,2\n").unwrap_err();
        assert_eq!(err.kind, datatrust_core::ConnectorErrorKind::SchemaMismatch);
    }

    #[test]
    fn round_trip_preserves_simple_values() {
        let format = CsvFormat::default();
        let records = vec![
            Record::from_value(json!({"id": 1, "name": "Ada", "active": true})).unwrap(),
            Record::from_value(json!({"id": 2, "name": "Grace", "active": false})).unwrap(),
        ];
        let bytes = format.serialize(None, &records).unwrap();
        let parsed = format.parse(&bytes).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn formula_cells_are_escaped_on_write() {
        let format = CsvFormat::default();
        let records = vec![Record::from_value(json!({"name": "=2+2"})).unwrap()];
        let bytes = format.serialize(None, &records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("'=2+2"));
        assert!(!text.contains("\n=2+2"));
    }

    #[test]
    fn formula_detection_skips_leading_blanks() {
        assert!(is_formula_shaped("=SUM(A1)"));
        assert!(is_formula_shaped("  +1"));
        assert!(is_formula_shaped("\t@cmd"));
        assert!(is_formula_shaped(" -1"));
        assert!(!is_formula_shaped("plain"));
        assert!(!is_formula_shaped("a=b"));
    }

    #[test]
    fn negative_numbers_stay_numeric_and_unescaped() {
        let format = CsvFormat::default();
        let records = vec![Record::from_value(json!({"delta": -3})).unwrap()];
        let bytes = format.serialize(None, &records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("-3"));
        assert!(!text.contains("'-3"));
    }
}
