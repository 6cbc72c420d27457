// crates/datatrust-core/src/filter.rs
// ============================================================================
// Module: DataTrust Filter Model
// Description: Filter conditions, projection, ordering, and pagination.
// Purpose: Provide the read-side query surface shared by all connectors.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Read requests carry a conjunction of filter conditions plus optional
//! projection, ordering, and pagination. Connectors either translate the
//! filter to their native query language (SQL, SaaS search) or evaluate it
//! in-process with [`matches_record`]. Pagination is offset-based or
//! cursor-based, never both.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::record::Record;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Comparison operator for a filter condition.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Strictly greater than.
    Gt,
    /// Strictly less than.
    Lt,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
    /// Case-insensitive substring containment.
    Contains,
    /// Membership in an array of values.
    In,
}

impl FilterOperator {
    /// Returns a stable label for this operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::In => "in",
        }
    }
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Single filter condition over a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Field name the condition applies to.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOperator,
    /// Comparison value.
    pub value: Value,
}

impl FilterCondition {
    /// Creates a filter condition.
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

// ============================================================================
// SECTION: Ordering and Pagination
// ============================================================================

/// Sort direction for an order-by entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Order-by entry combining a field and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to sort on.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Pagination mode for a read request.
///
/// # Invariants
/// - Offset and cursor pagination are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pagination {
    /// Offset-based pagination.
    Offset {
        /// Number of records to skip.
        offset: u64,
        /// Maximum number of records to return.
        limit: u64,
    },
    /// Cursor-based pagination.
    Cursor {
        /// Opaque continuation cursor from a previous read.
        cursor: String,
        /// Maximum number of records to return.
        limit: u64,
    },
}

impl Pagination {
    /// Returns the page limit.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        match self {
            Self::Offset {
                limit, ..
            }
            | Self::Cursor {
                limit, ..
            } => *limit,
        }
    }
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

/// Full read-side query options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Conjunction of filter conditions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FilterCondition>,
    /// Projection list; empty selects every field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    /// Ordering entries applied in sequence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    /// Pagination mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl FilterOptions {
    /// Returns the field names referenced by conditions.
    #[must_use]
    pub fn where_fields(&self) -> Vec<&str> {
        self.conditions.iter().map(|cond| cond.field.as_str()).collect()
    }
}

// ============================================================================
// SECTION: In-Process Evaluation
// ============================================================================

/// Returns true when a record satisfies every condition.
#[must_use]
pub fn matches_record(record: &Record, conditions: &[FilterCondition]) -> bool {
    conditions.iter().all(|condition| matches_condition(record, condition))
}

/// Evaluates a single condition against a record.
fn matches_condition(record: &Record, condition: &FilterCondition) -> bool {
    let value = record.get(&condition.field);
    match condition.op {
        FilterOperator::Eq => value == Some(&condition.value),
        FilterOperator::Ne => value != Some(&condition.value),
        FilterOperator::Gt => compare(value, &condition.value).is_some_and(Ordering::is_gt),
        FilterOperator::Lt => compare(value, &condition.value).is_some_and(Ordering::is_lt),
        FilterOperator::Gte => compare(value, &condition.value).is_some_and(Ordering::is_ge),
        FilterOperator::Lte => compare(value, &condition.value).is_some_and(Ordering::is_le),
        FilterOperator::Contains => contains(value, &condition.value),
        FilterOperator::In => in_set(value, &condition.value),
    }
}

/// Orders a record value against a condition value when comparable.
fn compare(value: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let value = value?;
    if let (Some(left), Some(right)) = (value.as_f64(), expected.as_f64()) {
        return left.partial_cmp(&right);
    }
    if let (Value::String(left), Value::String(right)) = (value, expected) {
        return Some(left.as_str().cmp(right.as_str()));
    }
    None
}

/// Case-insensitive substring containment.
fn contains(value: Option<&Value>, needle: &Value) -> bool {
    let (Some(Value::String(haystack)), Value::String(needle)) = (value, needle) else {
        return false;
    };
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Membership test against an array of values.
fn in_set(value: Option<&Value>, expected: &Value) -> bool {
    let (Some(value), Value::Array(candidates)) = (value, expected) else {
        return false;
    };
    candidates.contains(value)
}

/// Sorts records in place according to order-by entries.
pub fn sort_records(records: &mut [Record], order_by: &[OrderBy]) {
    records.sort_by(|left, right| {
        for entry in order_by {
            let ordering = order_values(left.get(&entry.field), right.get(&entry.field));
            let ordering = match entry.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Total order over optional JSON values for sorting.
///
/// Missing and null values sort first; numbers before strings; other value
/// kinds compare by their JSON rendering to keep the order total.
fn order_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None | Some(Value::Null)) => Ordering::Greater,
        (Some(left), Some(right)) => {
            if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            }
            if let (Value::String(a), Value::String(b)) = (left, right) {
                return a.cmp(b);
            }
            left.to_string().cmp(&right.to_string())
        }
    }
}

/// Projects a record onto selected fields; empty selection keeps every field.
#[must_use]
pub fn project_record(record: &Record, select: &[String]) -> Record {
    if select.is_empty() {
        return record.clone();
    }
    let mut projected = Record::new();
    for field in select {
        if let Some(value) = record.get(field) {
            // Keys originate from an already-validated record.
            let _ = projected.insert(field.clone(), value.clone());
        }
    }
    projected
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::FilterCondition;
    use super::FilterOperator;
    use super::OrderBy;
    use super::SortDirection;
    use super::matches_record;
    use super::project_record;
    use super::sort_records;
    use crate::record::Record;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn conjunction_requires_all_conditions() {
        let rec = record(json!({"id": 3, "name": "Ada"}));
        let both = vec![
            FilterCondition::new("id", FilterOperator::Gte, json!(3)),
            FilterCondition::new("name", FilterOperator::Contains, json!("ad")),
        ];
        assert!(matches_record(&rec, &both));
        let failing = vec![
            FilterCondition::new("id", FilterOperator::Gt, json!(3)),
            FilterCondition::new("name", FilterOperator::Contains, json!("ad")),
        ];
        assert!(!matches_record(&rec, &failing));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let rec = record(json!({"name": "Grace Hopper"}));
        let cond = vec![FilterCondition::new("name", FilterOperator::Contains, json!("HOPPER"))];
        assert!(matches_record(&rec, &cond));
    }

    #[test]
    fn in_operator_checks_membership() {
        let rec = record(json!({"status": "open"}));
        let cond = vec![FilterCondition::new(
            "status",
            FilterOperator::In,
            json!(["open", "pending"]),
        )];
        assert!(matches_record(&rec, &cond));
    }

    #[test]
    fn sort_applies_entries_in_sequence() {
        let mut records = vec![
            record(json!({"a": 2, "b": "x"})),
            record(json!({"a": 1, "b": "z"})),
            record(json!({"a": 1, "b": "y"})),
        ];
        sort_records(
            &mut records,
            &[
                OrderBy {
                    field: "a".to_string(),
                    direction: SortDirection::Asc,
                },
                OrderBy {
                    field: "b".to_string(),
                    direction: SortDirection::Desc,
                },
            ],
        );
        assert_eq!(records[0].get("b"), Some(&json!("z")));
        assert_eq!(records[2].get("a"), Some(&json!(2)));
    }

    #[test]
    fn projection_keeps_selected_fields_only() {
        let rec = record(json!({"id": 1, "email": "a@x", "name": "A"}));
        let projected = project_record(&rec, &["id".to_string(), "name".to_string()]);
        assert_eq!(projected.len(), 2);
        assert!(projected.get("email").is_none());
    }
}
