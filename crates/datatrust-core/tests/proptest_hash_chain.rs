// crates/datatrust-core/tests/proptest_hash_chain.rs
// ============================================================================
// Module: Hash Chain Property-Based Tests
// Description: Property tests for chain construction and verification.
// Purpose: Detect broken-link misses across wide input ranges.
// ============================================================================

//! Property-based tests for hash-chain invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use datatrust_core::hashing::GENESIS_PREV_HASH;
use datatrust_core::hashing::chain_hash;
use datatrust_core::hashing::verify_chain;
use proptest::prelude::*;

/// Builds a well-formed chain over the given entry payloads.
fn build_chain(entries: &[Vec<u8>]) -> Vec<(String, String, Vec<u8>)> {
    let mut links = Vec::with_capacity(entries.len());
    let mut prev = GENESIS_PREV_HASH.to_string();
    for entry in entries {
        let hash = chain_hash(&prev, entry);
        links.push((prev.clone(), hash.clone(), entry.clone()));
        prev = hash;
    }
    links
}

proptest! {
    #[test]
    fn well_formed_chains_always_verify(entries in prop::collection::vec(
        prop::collection::vec(any::<u8>(), 0..64),
        0..16,
    )) {
        let links = build_chain(&entries);
        let verdict = verify_chain(&links);
        prop_assert!(verdict.valid);
        prop_assert_eq!(verdict.entries, entries.len());
    }

    #[test]
    fn flipping_any_entry_breaks_the_chain(
        entries in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..16),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut links = build_chain(&entries);
        let index = victim.index(links.len());
        links[index].2[0] = links[index].2[0].wrapping_add(1);
        let verdict = verify_chain(&links);
        prop_assert!(!verdict.valid);
        prop_assert_eq!(verdict.broken_at, Some(index));
    }

    #[test]
    fn chained_hashes_are_distinct_per_prefix(entry in prop::collection::vec(any::<u8>(), 0..64)) {
        let first = chain_hash(GENESIS_PREV_HASH, &entry);
        let second = chain_hash(&first, &entry);
        prop_assert_ne!(first, second);
    }
}
