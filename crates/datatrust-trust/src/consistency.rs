// crates/datatrust-trust/src/consistency.rs
// ============================================================================
// Module: Consistency Monitor
// Description: Field-mapped comparison of two connectors.
// Purpose: Surface per-record and per-field drift between data sources.
// Dependencies: datatrust-core, serde, time, crate::loader
// ============================================================================

//! ## Overview
//! The monitor loads both sides (bounded, cursor-preferred), indexes the
//! target by its key fields, and walks the source once. Mapped fields are
//! transformed, then compared with a named comparator from the registry.
//! Built-ins cover exact, case-insensitive, numeric-tolerance, date-only,
//! and trimmed-string comparison; callers may register their own. A value
//! absent on both sides counts as a match.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use datatrust_core::Connector;
use datatrust_core::FilterOptions;
use datatrust_core::Record;
use datatrust_core::TrustError;
use datatrust_core::TrustErrorKind;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::loader::clamp_max_records;
use crate::loader::load_records;
use crate::loader::require_connected;

// ============================================================================
// SECTION: Mapping
// ============================================================================

/// Value transform applied before comparison.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    /// Lowercase strings.
    Lowercase,
    /// Uppercase strings.
    Uppercase,
    /// Trim surrounding whitespace.
    Trim,
    /// Collapse internal whitespace runs to single spaces.
    NormalizeWhitespace,
    /// Parse strings into epoch milliseconds.
    ParseDate,
    /// Parse strings into numbers.
    ParseNumber,
    /// Render any value as a string.
    ToString,
}

/// One source-to-target field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldMapping {
    /// Source field name.
    pub source_field: String,
    /// Target field name.
    pub target_field: String,
    /// Optional transform applied to both sides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Comparator name; defaults to `exact`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparator: Option<String>,
}

/// Comparison options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompareOptions {
    /// Field mappings to compare.
    pub mappings: Vec<FieldMapping>,
    /// Source-side key fields (single or composite).
    pub source_key: Vec<String>,
    /// Target-side key fields, parallel to `source_key`.
    pub target_key: Vec<String>,
    /// Record bound; clamped to the absolute cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u64>,
}

// ============================================================================
// SECTION: Comparators
// ============================================================================

/// Comparator function over transformed values.
pub type ComparatorFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Registry of named comparators with composable user extensions.
#[derive(Clone)]
pub struct ComparatorRegistry {
    /// Comparators keyed by name.
    comparators: BTreeMap<String, ComparatorFn>,
}

impl ComparatorRegistry {
    /// Creates a registry holding the built-in comparators.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            comparators: BTreeMap::new(),
        };
        registry.register("exact", |a, b| a == b);
        registry.register("caseInsensitive", |a, b| match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
            _ => a == b,
        });
        registry.register("numericTolerance", |a, b| match (json_number(a), json_number(b)) {
            (Some(a), Some(b)) => (a - b).abs() < 0.001,
            _ => false,
        });
        registry.register("dateOnly", |a, b| match (date_of(a), date_of(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        });
        registry.register("trimmedString", |a, b| match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => a.trim() == b.trim(),
            _ => a == b,
        });
        registry
    }

    /// Registers or replaces a comparator by name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        comparator: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) {
        self.comparators.insert(name.into(), Arc::new(comparator));
    }

    /// Resolves a comparator by name.
    ///
    /// # Errors
    ///
    /// Returns `MAPPING_ERROR` for unknown comparator names.
    pub fn resolve(&self, name: &str) -> Result<ComparatorFn, TrustError> {
        self.comparators.get(name).cloned().ok_or_else(|| {
            TrustError::new(
                TrustErrorKind::MappingError,
                format!("unknown comparator `{name}`"),
            )
            .with_suggestion("register the comparator or use a built-in name")
        })
    }
}

/// Extracts an f64 from numeric or numeric-string values.
fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Extracts the `YYYY-MM-DD` date part of a value.
fn date_of(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    if let Ok(moment) = OffsetDateTime::parse(text, &Rfc3339) {
        let date = moment.date();
        return Some(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ));
    }
    (text.len() >= 10 && text.as_bytes()[4] == b'-').then(|| text[..10].to_string())
}

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Kind of a field-level difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    /// Values differ under the comparator.
    ValueMismatch,
    /// Present on the target only.
    MissingInSource,
    /// Present on the source only.
    MissingInTarget,
    /// Value kinds differ.
    TypeMismatch,
}

/// One field-level difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    /// Source field name.
    pub source_field: String,
    /// Target field name.
    pub target_field: String,
    /// Difference kind.
    pub kind: DifferenceKind,
    /// Transformed source value.
    pub source_value: Value,
    /// Transformed target value.
    pub target_value: Value,
}

/// Per-record comparison status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Every mapped field matched.
    Match,
    /// At least one mapped field differed.
    Difference,
    /// Key present on the source only.
    SourceOnly,
    /// Key present on the target only.
    TargetOnly,
}

/// Per-record comparison outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordComparison {
    /// JSON-encoded composite key.
    pub key: String,
    /// Record status.
    pub status: RecordStatus,
    /// Field differences when status is `difference`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differences: Vec<FieldDifference>,
    /// Source record, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_record: Option<Record>,
    /// Target record, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_record: Option<Record>,
}

/// Comparison summary counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// Records loaded from the source.
    pub source_count: u64,
    /// Records loaded from the target.
    pub target_count: u64,
    /// Fully matching records.
    pub match_count: u64,
    /// Records with field differences.
    pub difference_count: u64,
    /// Keys present on the source only.
    pub source_only: u64,
    /// Keys present on the target only.
    pub target_only: u64,
}

/// Full comparison report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Source connector id.
    pub source_id: String,
    /// Target connector id.
    pub target_id: String,
    /// Summary counts.
    pub summary: ComparisonSummary,
    /// Per-record outcomes.
    pub records: Vec<RecordComparison>,
}

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Compares two connectors under a mapping and key configuration.
///
/// # Errors
///
/// Returns [`TrustError`] for disconnected connectors, invalid mappings,
/// missing key fields, or connector read failures.
pub async fn compare_connectors(
    source: &dyn Connector,
    target: &dyn Connector,
    options: &CompareOptions,
    registry: &ComparatorRegistry,
) -> Result<ComparisonReport, TrustError> {
    require_connected(source, TrustErrorKind::SourceNotConnected)?;
    require_connected(target, TrustErrorKind::TargetNotConnected)?;
    validate_options(options)?;

    let max_records = clamp_max_records(options.max_records);
    let source_records = load_records(source, &FilterOptions::default(), max_records).await?;
    let target_records = load_records(target, &FilterOptions::default(), max_records).await?;

    // Resolve comparators up front so a bad name fails before any work.
    let mut comparators = Vec::with_capacity(options.mappings.len());
    for mapping in &options.mappings {
        comparators.push(registry.resolve(mapping.comparator.as_deref().unwrap_or("exact"))?);
    }

    let mut target_index: BTreeMap<String, (usize, &Record)> = BTreeMap::new();
    for (index, record) in target_records.iter().enumerate() {
        let key = composite_key(record, &options.target_key)?;
        target_index.entry(key).or_insert((index, record));
    }

    let mut claimed: Vec<bool> = vec![false; target_records.len()];
    let mut records = Vec::new();
    let mut summary = ComparisonSummary {
        source_count: source_records.len() as u64,
        target_count: target_records.len() as u64,
        ..ComparisonSummary::default()
    };

    for source_record in &source_records {
        let key = composite_key(source_record, &options.source_key)?;
        match target_index.get(&key) {
            None => {
                summary.source_only += 1;
                records.push(RecordComparison {
                    key,
                    status: RecordStatus::SourceOnly,
                    differences: Vec::new(),
                    source_record: Some(source_record.clone()),
                    target_record: None,
                });
            }
            Some((target_pos, target_record)) => {
                claimed[*target_pos] = true;
                let differences =
                    compare_mapped_fields(source_record, target_record, options, &comparators);
                if differences.is_empty() {
                    summary.match_count += 1;
                    records.push(RecordComparison {
                        key,
                        status: RecordStatus::Match,
                        differences,
                        source_record: None,
                        target_record: None,
                    });
                } else {
                    summary.difference_count += 1;
                    records.push(RecordComparison {
                        key,
                        status: RecordStatus::Difference,
                        differences,
                        source_record: Some(source_record.clone()),
                        target_record: Some((*target_record).clone()),
                    });
                }
            }
        }
    }

    for (index, record) in target_records.iter().enumerate() {
        if !claimed[index] {
            summary.target_only += 1;
            records.push(RecordComparison {
                key: composite_key(record, &options.target_key)?,
                status: RecordStatus::TargetOnly,
                differences: Vec::new(),
                source_record: None,
                target_record: Some(record.clone()),
            });
        }
    }

    Ok(ComparisonReport {
        source_id: source.info().id,
        target_id: target.info().id,
        summary,
        records,
    })
}

/// Validates mapping and key options.
fn validate_options(options: &CompareOptions) -> Result<(), TrustError> {
    if options.mappings.is_empty() {
        return Err(TrustError::new(
            TrustErrorKind::MappingError,
            "at least one field mapping is required",
        ));
    }
    if options.source_key.is_empty() || options.source_key.len() != options.target_key.len() {
        return Err(TrustError::new(
            TrustErrorKind::InvalidOptions,
            "source_key and target_key must be non-empty and the same length",
        )
        .with_suggestion("key fields pair positionally between the two sides"));
    }
    Ok(())
}

/// Builds the JSON-encoded composite key for a record.
fn composite_key(record: &Record, key_fields: &[String]) -> Result<String, TrustError> {
    let mut parts = Vec::with_capacity(key_fields.len());
    for field in key_fields {
        let value = record.get(field).ok_or_else(|| {
            TrustError::new(
                TrustErrorKind::KeyFieldMissing,
                format!("record is missing key field `{field}`"),
            )
            .with_suggestion("choose key fields present on every record")
        })?;
        parts.push(value.clone());
    }
    if parts.len() == 1 {
        Ok(parts[0].to_string())
    } else {
        Ok(Value::Array(parts).to_string())
    }
}

/// Compares all mapped fields of one record pair.
fn compare_mapped_fields(
    source: &Record,
    target: &Record,
    options: &CompareOptions,
    comparators: &[ComparatorFn],
) -> Vec<FieldDifference> {
    let mut differences = Vec::new();
    for (mapping, comparator) in options.mappings.iter().zip(comparators) {
        let source_value = source.get(&mapping.source_field).map(|v| transform(v, mapping.transform));
        let target_value = target.get(&mapping.target_field).map(|v| transform(v, mapping.transform));
        match (source_value, target_value) {
            // Absent on both sides counts as a match.
            (None, None) => {}
            (Some(source_value), None) => differences.push(FieldDifference {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
                kind: DifferenceKind::MissingInTarget,
                source_value,
                target_value: Value::Null,
            }),
            (None, Some(target_value)) => differences.push(FieldDifference {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
                kind: DifferenceKind::MissingInSource,
                source_value: Value::Null,
                target_value,
            }),
            (Some(source_value), Some(target_value)) => {
                if kind_of(&source_value) != kind_of(&target_value) {
                    differences.push(FieldDifference {
                        source_field: mapping.source_field.clone(),
                        target_field: mapping.target_field.clone(),
                        kind: DifferenceKind::TypeMismatch,
                        source_value,
                        target_value,
                    });
                } else if !comparator(&source_value, &target_value) {
                    differences.push(FieldDifference {
                        source_field: mapping.source_field.clone(),
                        target_field: mapping.target_field.clone(),
                        kind: DifferenceKind::ValueMismatch,
                        source_value,
                        target_value,
                    });
                }
            }
        }
    }
    differences
}

/// Applies a transform to a value.
fn transform(value: &Value, transform: Option<Transform>) -> Value {
    let Some(transform) = transform else {
        return value.clone();
    };
    match transform {
        Transform::Lowercase => value
            .as_str()
            .map_or_else(|| value.clone(), |text| Value::String(text.to_lowercase())),
        Transform::Uppercase => value
            .as_str()
            .map_or_else(|| value.clone(), |text| Value::String(text.to_uppercase())),
        Transform::Trim => value
            .as_str()
            .map_or_else(|| value.clone(), |text| Value::String(text.trim().to_string())),
        Transform::NormalizeWhitespace => value.as_str().map_or_else(
            || value.clone(),
            |text| Value::String(text.split_whitespace().collect::<Vec<_>>().join(" ")),
        ),
        Transform::ParseDate => value
            .as_str()
            .and_then(|text| datatrust_core::Timestamp::parse_rfc3339(text))
            .map_or_else(|| value.clone(), |ts| Value::Number(ts.as_millis().into())),
        Transform::ParseNumber => json_number(value)
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        Transform::ToString => match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        },
    }
}

/// Returns the JSON kind label used for type-mismatch detection.
const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
