// crates/datatrust-core/src/identifiers.rs
// ============================================================================
// Module: DataTrust Identifiers
// Description: Trace and decision identifiers plus filesystem-safe sanitizing.
// Purpose: Provide strongly typed identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Trace identifiers follow the W3C trace-context format (32 lowercase hex
//! characters) and may be inherited from a `traceparent` header. Decision
//! identifiers are opaque per-evaluation tokens. Connector and snapshot
//! identifiers are sanitized before they touch the filesystem.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Trace Identifier
// ============================================================================

/// W3C-format trace identifier (32 lowercase hex chars).
///
/// # Invariants
/// - Always 32 lowercase hexadecimal characters, never all zeros.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Builds a trace identifier from 16 raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut rendered = String::with_capacity(32);
        for byte in bytes {
            rendered.push_str(&format!("{byte:02x}"));
        }
        Self(rendered)
    }

    /// Parses a `traceparent` header, returning the embedded trace id.
    ///
    /// Accepts the `version-traceid-parentid-flags` layout and rejects the
    /// all-zero trace id. Invalid headers return `None` so callers mint a
    /// fresh identifier instead.
    #[must_use]
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() && version == "00" {
            return None;
        }
        if version.len() != 2 || parent_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        if trace_id.len() != 32
            || !trace_id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return None;
        }
        if trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        Some(Self(trace_id.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Decision Identifier
// ============================================================================

/// Opaque identifier assigned to each policy evaluation.
///
/// # Invariants
/// - Opaque UTF-8 string; uniqueness is a generator responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(String);

impl DecisionId {
    /// Creates a decision identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SECTION: Filesystem Sanitizing
// ============================================================================

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
///
/// Applied to connector and snapshot identifiers before they become path
/// components, so untrusted ids can never traverse directories.
#[must_use]
pub fn sanitize_path_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::TraceId;
    use super::sanitize_path_component;

    #[test]
    fn traceparent_round_trip() {
        let header = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
        let trace = TraceId::from_traceparent(header).unwrap();
        assert_eq!(trace.as_str(), "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    #[test]
    fn traceparent_rejects_zero_and_malformed() {
        assert!(TraceId::from_traceparent("00-00000000000000000000000000000000-0000000000000000-00").is_none());
        assert!(TraceId::from_traceparent("garbage").is_none());
        assert!(
            TraceId::from_traceparent("00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01")
                .is_none()
        );
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize_path_component("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_path_component("csv-users_1"), "csv-users_1");
    }
}
