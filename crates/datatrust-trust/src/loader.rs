// crates/datatrust-trust/src/loader.rs
// ============================================================================
// Module: Bounded Record Loader
// Description: Cursor-preferred paged loading from a connector.
// Purpose: Give every trust primitive one bounded way to pull records.
// Dependencies: datatrust-core
// ============================================================================

//! ## Overview
//! Trust primitives load full record sets in pages, preferring cursor
//! pagination and falling back to offsets when a connector returns no
//! cursor. Loads are bounded by `max_records` (absolute cap 1,000,000;
//! default 100,000); a bound of zero yields an empty set without error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::ConnectionState;
use datatrust_core::Connector;
use datatrust_core::FilterOptions;
use datatrust_core::Pagination;
use datatrust_core::Record;
use datatrust_core::TrustError;
use datatrust_core::TrustErrorKind;

// ============================================================================
// SECTION: Bounds
// ============================================================================

/// Default record bound for trust-primitive loads.
pub const DEFAULT_MAX_RECORDS: u64 = 100_000;

/// Absolute record cap no option may exceed.
pub const ABSOLUTE_MAX_RECORDS: u64 = 1_000_000;

/// Page size used for bounded loads.
const PAGE_SIZE: u64 = 1_000;

/// Clamps a requested bound to the absolute cap.
#[must_use]
pub fn clamp_max_records(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_MAX_RECORDS).min(ABSOLUTE_MAX_RECORDS)
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Fails with the given kind when the connector is not connected.
///
/// # Errors
///
/// Returns a [`TrustError`] of `kind` naming the connector.
pub fn require_connected(
    connector: &dyn Connector,
    kind: TrustErrorKind,
) -> Result<(), TrustError> {
    if connector.state() == ConnectionState::Connected {
        Ok(())
    } else {
        let info = connector.info();
        Err(TrustError::new(kind, format!("connector `{}` is not connected", info.id))
            .with_suggestion("connect the connector before running trust operations"))
    }
}

/// Loads up to `max_records` records matching the filter conditions.
///
/// # Errors
///
/// Returns a [`TrustError`] wrapping the first connector failure.
pub async fn load_records(
    connector: &dyn Connector,
    base_filter: &FilterOptions,
    max_records: u64,
) -> Result<Vec<Record>, TrustError> {
    let mut loaded: Vec<Record> = Vec::new();
    if max_records == 0 {
        return Ok(loaded);
    }

    let mut pagination = Pagination::Offset {
        offset: 0,
        limit: PAGE_SIZE.min(max_records),
    };
    loop {
        let mut filter = base_filter.clone();
        filter.pagination = Some(pagination.clone());
        let page = connector.read_records(&filter).await.map_err(TrustError::from)?;
        let page_len = page.records.len() as u64;
        for record in page.records {
            if (loaded.len() as u64) < max_records {
                loaded.push(record);
            }
        }
        if loaded.len() as u64 >= max_records || !page.has_more || page_len == 0 {
            break;
        }
        let remaining = max_records - loaded.len() as u64;
        pagination = match page.next_cursor {
            Some(cursor) => Pagination::Cursor {
                cursor,
                limit: PAGE_SIZE.min(remaining),
            },
            None => Pagination::Offset {
                offset: loaded.len() as u64,
                limit: PAGE_SIZE.min(remaining),
            },
        };
    }
    Ok(loaded)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::clamp_max_records;

    #[test]
    fn bounds_are_clamped_to_the_absolute_cap() {
        assert_eq!(clamp_max_records(None), 100_000);
        assert_eq!(clamp_max_records(Some(10)), 10);
        assert_eq!(clamp_max_records(Some(5_000_000)), 1_000_000);
        assert_eq!(clamp_max_records(Some(0)), 0);
    }
}
