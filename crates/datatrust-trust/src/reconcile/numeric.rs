// crates/datatrust-trust/src/reconcile/numeric.rs
// ============================================================================
// Module: Locale-Tolerant Numeric Parsing
// Description: Coerce currency-laden, locale-formatted strings into numbers.
// Purpose: Back the `equals_tolerance` operator across data sources.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Business exports render the same amount as `1,234.56`, `1.234,56`,
//! `$1234.56`, or `1 234,56`. The parser strips currency symbols and
//! spacing, then decides which separator is the decimal point: when both
//! appear, the rightmost wins; a lone separator is decimal unless it is
//! followed by exactly three digits (a thousands group).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Coerces a JSON value into a number, tolerating locale formats.
#[must_use]
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_locale_number(text),
        _ => None,
    }
}

/// Parses a locale-formatted numeric string.
#[must_use]
pub fn parse_locale_number(text: &str) -> Option<f64> {
    let mut cleaned = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '$' | '€' | '£' | '¥' | ' ' | '\u{a0}' | '\'' => {}
            '(' => cleaned.push('-'),
            ')' => {}
            _ => cleaned.push(ch),
        }
    }
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(comma), Some(dot)) => {
            // The rightmost separator is the decimal point.
            let (decimal, thousands) = if comma > dot { (',', '.') } else { ('.', ',') };
            cleaned
                .chars()
                .filter(|&ch| ch != thousands)
                .map(|ch| if ch == decimal { '.' } else { ch })
                .collect::<String>()
        }
        (Some(position), None) => normalize_single(cleaned, ',', position),
        (None, Some(position)) => normalize_single(cleaned, '.', position),
        (None, None) => cleaned.to_string(),
    };
    normalized.parse().ok()
}

/// Normalizes a string holding one separator kind.
fn normalize_single(cleaned: &str, separator: char, last_position: usize) -> String {
    let count = cleaned.matches(separator).count();
    let digits_after = cleaned.len() - last_position - separator.len_utf8();
    if count == 1 && digits_after != 3 {
        // A lone separator not forming a thousands group is the decimal point.
        cleaned
            .chars()
            .map(|ch| if ch == separator { '.' } else { ch })
            .collect()
    } else {
        // Thousands grouping: drop every separator.
        cleaned.chars().filter(|&ch| ch != separator).collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::panic,
        clippy::float_cmp,
        reason = "Test-only assertions on exact parses."
    )]

    use super::parse_locale_number;

    #[test]
    fn parses_both_locale_conventions() {
        assert_eq!(parse_locale_number("1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_locale_number("1.234,56").unwrap(), 1234.56);
        assert_eq!(parse_locale_number("1.234.567,89").unwrap(), 1_234_567.89);
    }

    #[test]
    fn strips_currency_and_spacing() {
        assert_eq!(parse_locale_number("$1234.56").unwrap(), 1234.56);
        assert_eq!(parse_locale_number("€ 1 234,56").unwrap(), 1234.56);
        assert_eq!(parse_locale_number("(42.50)").unwrap(), -42.5);
    }

    #[test]
    fn lone_separator_heuristics() {
        assert_eq!(parse_locale_number("9,5").unwrap(), 9.5);
        assert_eq!(parse_locale_number("9.5").unwrap(), 9.5);
        assert_eq!(parse_locale_number("1,234").unwrap(), 1234.0);
        assert_eq!(parse_locale_number("1.234").unwrap(), 1234.0);
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(parse_locale_number("n/a").is_none());
        assert!(parse_locale_number("").is_none());
    }
}
