// crates/datatrust-connectors/src/sql/builder.rs
// ============================================================================
// Module: SQL Statement Builder
// Description: Build parameterized SELECT/INSERT/UPDATE statements.
// Purpose: Translate filter options and write batches under the guard rules.
// Dependencies: datatrust-core, crate::sql
// ============================================================================

//! ## Overview
//! The builder validates every identifier against the grammar and the
//! table's column set before a single character of SQL is produced, then
//! renders statements whose literal values are all bound parameters.
//! `contains` compiles to a lowercased `LIKE` with escaped wildcards; `in`
//! expands to a placeholder list; an empty `in` list matches nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::FilterCondition;
use datatrust_core::FilterOperator;
use datatrust_core::FilterOptions;
use datatrust_core::Pagination;
use datatrust_core::Record;
use datatrust_core::SortDirection;
use serde_json::Value;

use crate::paging::decode_cursor;
use crate::sql::SqlDialect;
use crate::sql::require_identifier;
use crate::sql::executor::SqlStatement;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Statement builder bound to one table and its column set.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    /// Dialect for placeholder rendering.
    dialect: SqlDialect,
    /// Validated table name.
    table: String,
    /// Validated optional schema qualifier.
    schema: Option<String>,
    /// Column set from the cached table schema.
    columns: BTreeSet<String>,
}

impl StatementBuilder {
    /// Creates a builder after validating table and schema identifiers.
    ///
    /// # Errors
    ///
    /// Returns a `READ_FAILED` error for invalid identifiers.
    pub fn new(
        dialect: SqlDialect,
        table: &str,
        schema: Option<&str>,
        columns: BTreeSet<String>,
    ) -> Result<Self, ConnectorError> {
        require_identifier("table", table)?;
        if let Some(schema) = schema {
            require_identifier("schema", schema)?;
        }
        Ok(Self {
            dialect,
            table: table.to_string(),
            schema: schema.map(str::to_string),
            columns,
        })
    }

    /// Renders the qualified table reference.
    fn table_ref(&self) -> String {
        self.schema.as_ref().map_or_else(
            || self.table.clone(),
            |schema| format!("{schema}.{}", self.table),
        )
    }

    /// Validates a column: grammar plus membership in the column set.
    fn require_column(&self, column: &str) -> Result<(), ConnectorError> {
        require_identifier("column", column)?;
        if self.columns.contains(column) {
            Ok(())
        } else {
            Err(ConnectorError::new(
                ConnectorErrorKind::ReadFailed,
                format!("column `{column}` is not present in table `{}`", self.table),
            )
            .with_suggestion("refresh the schema cache or fix the field name"))
        }
    }

    /// Builds a SELECT from filter options.
    ///
    /// The limit is extended by one row so the caller can detect `has_more`
    /// without a second query.
    ///
    /// # Errors
    ///
    /// Returns a `READ_FAILED` error for invalid identifiers, unknown
    /// columns, or a malformed cursor.
    pub fn select(&self, filter: &FilterOptions) -> Result<SelectPlan, ConnectorError> {
        for column in &filter.select {
            self.require_column(column)?;
        }
        for condition in &filter.conditions {
            self.require_column(&condition.field)?;
        }
        for entry in &filter.order_by {
            self.require_column(&entry.field)?;
        }

        let projection = if filter.select.is_empty() {
            "*".to_string()
        } else {
            filter.select.join(", ")
        };

        let mut sql = format!("SELECT {projection} FROM {}", self.table_ref());
        let mut params = Vec::new();
        if !filter.conditions.is_empty() {
            let mut clauses = Vec::with_capacity(filter.conditions.len());
            for condition in &filter.conditions {
                clauses.push(self.condition_clause(condition, &mut params)?);
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !filter.order_by.is_empty() {
            let entries: Vec<String> = filter
                .order_by
                .iter()
                .map(|entry| {
                    let direction = match entry.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{} {direction}", entry.field)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&entries.join(", "));
        }

        let (offset, limit) = match &filter.pagination {
            None => (0, None),
            Some(Pagination::Offset {
                offset,
                limit,
            }) => (*offset, Some(*limit)),
            Some(Pagination::Cursor {
                cursor,
                limit,
            }) => (decode_cursor(cursor)?, Some(*limit)),
        };
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.saturating_add(1)));
        }
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(SelectPlan {
            statement: SqlStatement {
                sql,
                params,
            },
            offset,
            limit,
        })
    }

    /// Renders one WHERE clause, pushing its bound parameters.
    fn condition_clause(
        &self,
        condition: &FilterCondition,
        params: &mut Vec<Value>,
    ) -> Result<String, ConnectorError> {
        let column = &condition.field;
        let clause = match condition.op {
            FilterOperator::Eq => {
                params.push(condition.value.clone());
                format!("{column} = {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::Ne => {
                params.push(condition.value.clone());
                format!("{column} <> {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::Gt => {
                params.push(condition.value.clone());
                format!("{column} > {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::Lt => {
                params.push(condition.value.clone());
                format!("{column} < {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::Gte => {
                params.push(condition.value.clone());
                format!("{column} >= {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::Lte => {
                params.push(condition.value.clone());
                format!("{column} <= {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::Contains => {
                let needle = condition.value.as_str().ok_or_else(|| {
                    ConnectorError::new(
                        ConnectorErrorKind::ReadFailed,
                        "contains expects a string value",
                    )
                })?;
                params.push(Value::String(format!("%{}%", escape_like(&needle.to_lowercase()))));
                format!("LOWER({column}) LIKE {}", self.dialect.placeholder(params.len()))
            }
            FilterOperator::In => {
                let Value::Array(values) = &condition.value else {
                    return Err(ConnectorError::new(
                        ConnectorErrorKind::ReadFailed,
                        "in expects an array value",
                    ));
                };
                if values.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    params.push(value.clone());
                    placeholders.push(self.dialect.placeholder(params.len()));
                }
                format!("{column} IN ({})", placeholders.join(", "))
            }
        };
        Ok(clause)
    }

    /// Builds a per-record INSERT.
    ///
    /// # Errors
    ///
    /// Returns a `READ_FAILED` error for invalid or unknown columns.
    pub fn insert(&self, record: &Record) -> Result<SqlStatement, ConnectorError> {
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (column, value) in record.iter() {
            self.require_column(column)?;
            columns.push(column.clone());
            params.push(value.clone());
        }
        if columns.is_empty() {
            return Err(ConnectorError::new(
                ConnectorErrorKind::ReadFailed,
                "insert record has no fields",
            ));
        }
        let placeholders: Vec<String> =
            (1..=params.len()).map(|index| self.dialect.placeholder(index)).collect();
        Ok(SqlStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table_ref(),
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        })
    }

    /// Builds a per-record UPDATE keyed on `key_column`.
    ///
    /// # Errors
    ///
    /// Returns a `READ_FAILED` error for invalid or unknown columns, or when
    /// the record is missing the key field.
    pub fn update(&self, record: &Record, key_column: &str) -> Result<SqlStatement, ConnectorError> {
        self.require_column(key_column)?;
        let key_value = record.get(key_column).cloned().ok_or_else(|| {
            ConnectorError::new(
                ConnectorErrorKind::ReadFailed,
                format!("record is missing key field `{key_column}`"),
            )
        })?;

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (column, value) in record.iter() {
            if column == key_column {
                continue;
            }
            self.require_column(column)?;
            params.push(value.clone());
            assignments.push(format!("{column} = {}", self.dialect.placeholder(params.len())));
        }
        if assignments.is_empty() {
            return Err(ConnectorError::new(
                ConnectorErrorKind::ReadFailed,
                "update record has no non-key fields",
            ));
        }
        params.push(key_value);
        Ok(SqlStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE {key_column} = {}",
                self.table_ref(),
                assignments.join(", "),
                self.dialect.placeholder(params.len())
            ),
            params,
        })
    }
}

/// SELECT statement plus the pagination window it encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    /// Built statement; limit is extended by one row for has-more detection.
    pub statement: SqlStatement,
    /// Requested offset.
    pub offset: u64,
    /// Requested limit, when paginated.
    pub limit: Option<u64>,
}

/// Escapes LIKE wildcards in a bound needle.
fn escape_like(needle: &str) -> String {
    needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use std::collections::BTreeSet;

    use datatrust_core::FilterCondition;
    use datatrust_core::FilterOperator;
    use datatrust_core::FilterOptions;
    use datatrust_core::Record;
    use serde_json::json;

    use super::StatementBuilder;
    use crate::sql::SqlDialect;

    fn builder(dialect: SqlDialect) -> StatementBuilder {
        let columns: BTreeSet<String> =
            ["id", "name", "email"].iter().map(ToString::to_string).collect();
        StatementBuilder::new(dialect, "users", None, columns).unwrap()
    }

    #[test]
    fn select_renders_bound_parameters_only() {
        let filter = FilterOptions {
            conditions: vec![
                FilterCondition::new("id", FilterOperator::Gte, json!(10)),
                FilterCondition::new("name", FilterOperator::Contains, json!("Ada")),
            ],
            ..FilterOptions::default()
        };
        let plan = builder(SqlDialect::Postgresql).select(&filter).unwrap();
        assert_eq!(
            plan.statement.sql,
            "SELECT * FROM users WHERE id >= $1 AND LOWER(name) LIKE $2"
        );
        assert_eq!(plan.statement.params, vec![json!(10), json!("%ada%")]);
    }

    #[test]
    fn injection_shaped_field_is_rejected_before_building() {
        let filter = FilterOptions {
            conditions: vec![FilterCondition::new(
                "id;DROP TABLE users;",
                FilterOperator::Eq,
                json!(1),
            )],
            ..FilterOptions::default()
        };
        let err = builder(SqlDialect::Postgresql).select(&filter).unwrap_err();
        assert_eq!(err.kind, datatrust_core::ConnectorErrorKind::ReadFailed);
    }

    #[test]
    fn unknown_column_is_rejected_even_when_grammatical() {
        let filter = FilterOptions {
            select: vec!["password".to_string()],
            ..FilterOptions::default()
        };
        let err = builder(SqlDialect::Postgresql).select(&filter).unwrap_err();
        assert!(err.message.contains("password"));
    }

    #[test]
    fn in_operator_expands_placeholders_per_dialect() {
        let filter = FilterOptions {
            conditions: vec![FilterCondition::new(
                "id",
                FilterOperator::In,
                json!([1, 2, 3]),
            )],
            ..FilterOptions::default()
        };
        let pg = builder(SqlDialect::Postgresql).select(&filter).unwrap();
        assert!(pg.statement.sql.contains("id IN ($1, $2, $3)"));
        let my = builder(SqlDialect::Mysql).select(&filter).unwrap();
        assert!(my.statement.sql.contains("id IN (?, ?, ?)"));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let filter = FilterOptions {
            conditions: vec![FilterCondition::new("id", FilterOperator::In, json!([]))],
            ..FilterOptions::default()
        };
        let plan = builder(SqlDialect::Postgresql).select(&filter).unwrap();
        assert!(plan.statement.sql.contains("1 = 0"));
        assert!(plan.statement.params.is_empty());
    }

    #[test]
    fn limit_is_extended_for_has_more_detection() {
        let filter = FilterOptions {
            pagination: Some(datatrust_core::Pagination::Offset {
                offset: 20,
                limit: 10,
            }),
            ..FilterOptions::default()
        };
        let plan = builder(SqlDialect::Postgresql).select(&filter).unwrap();
        assert!(plan.statement.sql.ends_with("LIMIT 11 OFFSET 20"));
        assert_eq!(plan.limit, Some(10));
    }

    #[test]
    fn insert_and_update_validate_every_column() {
        let record = Record::from_value(json!({"id": 1, "name": "Ada"})).unwrap();
        let insert = builder(SqlDialect::Postgresql).insert(&record).unwrap();
        assert_eq!(insert.sql, "INSERT INTO users (id, name) VALUES ($1, $2)");

        let update = builder(SqlDialect::Postgresql).update(&record, "id").unwrap();
        assert_eq!(update.sql, "UPDATE users SET name = $1 WHERE id = $2");
        assert_eq!(update.params, vec![json!("Ada"), json!(1)]);

        let bad = Record::from_value(json!({"nope": 1})).unwrap();
        assert!(builder(SqlDialect::Postgresql).insert(&bad).is_err());
    }
}
