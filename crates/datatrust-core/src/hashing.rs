// crates/datatrust-core/src/hashing.rs
// ============================================================================
// Module: DataTrust Hash Chain Primitives
// Description: SHA-256 helpers for tamper-evident append-only logs.
// Purpose: Provide the chain rule hash(N) = SHA-256(prev_hash || bytes(N)).
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Policy audit files are hash-chained: each entry stores the hash of its
//! predecessor and its own hash, computed over the previous hash concatenated
//! with the entry's canonical JSON bytes (hash fields excluded). The genesis
//! previous hash is the literal string `"0"`. Verification replays the chain
//! and reports the first broken link.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Previous-hash value for the first entry of a chain.
pub const GENESIS_PREV_HASH: &str = "0";

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Returns the lowercase hex SHA-256 of the input bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut rendered = String::with_capacity(64);
    for byte in digest {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

/// Computes the chained hash of an entry given its predecessor's hash.
#[must_use]
pub fn chain_hash(prev_hash: &str, entry_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(entry_bytes);
    let digest = hasher.finalize();
    let mut rendered = String::with_capacity(64);
    for byte in digest {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

/// Outcome of verifying a hash chain.
///
/// # Invariants
/// - `broken_at` is `None` iff `valid` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Whether every link verified.
    pub valid: bool,
    /// Zero-based index of the first broken entry when invalid.
    pub broken_at: Option<usize>,
    /// Number of entries examined.
    pub entries: usize,
}

/// Verifies a sequence of `(prev_hash, hash, entry_bytes)` links.
///
/// The first entry must use [`GENESIS_PREV_HASH`]; each subsequent entry's
/// `prev_hash` must equal its predecessor's `hash`.
#[must_use]
pub fn verify_chain(links: &[(String, String, Vec<u8>)]) -> ChainVerification {
    let mut expected_prev = GENESIS_PREV_HASH.to_string();
    for (index, (prev_hash, hash, bytes)) in links.iter().enumerate() {
        if *prev_hash != expected_prev || chain_hash(prev_hash, bytes) != *hash {
            return ChainVerification {
                valid: false,
                broken_at: Some(index),
                entries: links.len(),
            };
        }
        expected_prev.clone_from(hash);
    }
    ChainVerification {
        valid: true,
        broken_at: None,
        entries: links.len(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
