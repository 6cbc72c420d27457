// crates/datatrust-connectors/src/paging.rs
// ============================================================================
// Module: In-Process Read Pipeline
// Description: Filter, sort, paginate, and project loaded record sets.
// Purpose: Share the read-side query pipeline between memory and file connectors.
// Dependencies: base64, datatrust-core
// ============================================================================

//! ## Overview
//! Connectors that hold their full record set in memory evaluate filters
//! in-process: filter, sort, count, paginate, then project. Cursors are
//! opaque to callers; internally a cursor encodes the next record offset in
//! base64url so a page sequence is stable for an unchanged record set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::FilterOptions;
use datatrust_core::Pagination;
use datatrust_core::ReadResult;
use datatrust_core::Record;
use datatrust_core::filter::matches_record;
use datatrust_core::filter::project_record;
use datatrust_core::filter::sort_records;

// ============================================================================
// SECTION: Cursors
// ============================================================================

/// Cursor payload prefix guarding against foreign cursors.
const CURSOR_PREFIX: &str = "off:";

/// Encodes a record offset as an opaque cursor.
#[must_use]
pub fn encode_cursor(offset: u64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{CURSOR_PREFIX}{offset}"))
}

/// Decodes an opaque cursor back into a record offset.
///
/// # Errors
///
/// Returns a `READ_FAILED` error for malformed or foreign cursors.
pub fn decode_cursor(cursor: &str) -> Result<u64, ConnectorError> {
    let invalid = || {
        ConnectorError::new(ConnectorErrorKind::ReadFailed, "invalid pagination cursor")
            .with_suggestion("pass the next_cursor value from the previous read unchanged")
    };
    let decoded = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let offset = decoded.strip_prefix(CURSOR_PREFIX).ok_or_else(invalid)?;
    offset.parse::<u64>().map_err(|_| invalid())
}

// ============================================================================
// SECTION: Read Pipeline
// ============================================================================

/// Applies the full read pipeline to a loaded record set.
///
/// # Errors
///
/// Returns a `READ_FAILED` error when the cursor is malformed.
pub fn page_records(
    mut records: Vec<Record>,
    filter: &FilterOptions,
) -> Result<ReadResult, ConnectorError> {
    records.retain(|record| matches_record(record, &filter.conditions));
    sort_records(&mut records, &filter.order_by);
    let total = records.len() as u64;

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

    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(records.len());
    let end = limit.map_or(records.len(), |limit| {
        start.saturating_add(usize::try_from(limit).unwrap_or(usize::MAX)).min(records.len())
    });
    let has_more = end < records.len();
    let next_cursor = has_more.then(|| encode_cursor(end as u64));

    let page = records[start..end]
        .iter()
        .map(|record| project_record(record, &filter.select))
        .collect();

    Ok(ReadResult {
        records: page,
        total_count: Some(total),
        has_more,
        next_cursor,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
