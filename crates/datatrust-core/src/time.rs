// crates/datatrust-core/src/time.rs
// ============================================================================
// Module: DataTrust Time Model
// Description: Epoch-millisecond timestamps with RFC3339 rendering.
// Purpose: Provide one timestamp representation for audit, snapshots, logs.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Timestamps are unix epoch milliseconds on the wire and RFC3339 in text
//! reports and file names. The UTC calendar date drives audit file naming
//! and retention arithmetic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch milliseconds.
///
/// # Invariants
/// - Serializes as a plain integer for stable wire and file forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock timestamp.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        Self(millis)
    }

    /// Returns the epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Parses an RFC3339 string into a timestamp.
    #[must_use]
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339).ok()?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).ok().map(Self)
    }

    /// Renders the timestamp as RFC3339 UTC.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .and_then(|moment| moment.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }

    /// Returns the UTC calendar date of this timestamp.
    #[must_use]
    pub fn utc_date(self) -> Option<Date> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .ok()
            .map(OffsetDateTime::date)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

// ============================================================================
// SECTION: Calendar Helpers
// ============================================================================

/// Renders a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Parses a `YYYY-MM-DD` string into a date.
#[must_use]
pub fn parse_date(value: &str) -> Option<Date> {
    let mut parts = value.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = time::Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

/// Returns the cutoff date that is `days` whole days before `today`.
#[must_use]
pub fn retention_cutoff(today: Date, days: u32) -> Date {
    today.saturating_sub(Duration::days(i64::from(days)))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::Timestamp;
    use super::format_date;
    use super::parse_date;
    use super::retention_cutoff;

    #[test]
    fn rfc3339_round_trip() {
        let ts = Timestamp::parse_rfc3339("2026-02-01T10:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-02-01T10:30:00Z");
    }

    #[test]
    fn utc_date_matches_rendered_prefix() {
        let ts = Timestamp::parse_rfc3339("2026-02-01T23:59:59Z").unwrap();
        let date = ts.utc_date().unwrap();
        assert_eq!(format_date(date), "2026-02-01");
    }

    #[test]
    fn retention_cutoff_subtracts_calendar_days() {
        let today = parse_date("2026-03-01").unwrap();
        assert_eq!(format_date(retention_cutoff(today, 30)), "2026-01-30");
    }
}
