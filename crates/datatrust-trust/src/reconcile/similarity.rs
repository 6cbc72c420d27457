// crates/datatrust-trust/src/reconcile/similarity.rs
// ============================================================================
// Module: String Similarity
// Description: Similarity scores and phonetic encodings for matching rules.
// Purpose: Back the `similarity` operator with bounded, deterministic scores.
// Dependencies: strsim
// ============================================================================

//! ## Overview
//! Edit-distance scores come from `strsim`; n-gram Dice and Jaccard are
//! computed over configurable gram sizes; Soundex and Cologne Phonetic
//! reduce to code equality (1.0 or 0.0). Jaro-Winkler takes a configurable
//! prefix scale, capped at 0.25. Inputs longer than the guard limit are
//! refused by the caller before scoring.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Algorithms
// ============================================================================

/// Maximum input length accepted by similarity scoring.
pub const MAX_SIMILARITY_INPUT: usize = 10_000;

/// Maximum Jaro-Winkler prefix scale.
pub const MAX_PREFIX_SCALE: f64 = 0.25;

/// Similarity algorithm selector.
///
/// # Invariants
/// - Variants are stable for serialization and rule options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    /// Normalized Levenshtein distance.
    Levenshtein,
    /// Jaro similarity.
    Jaro,
    /// Jaro-Winkler with configurable prefix scale.
    JaroWinkler,
    /// Sørensen-Dice over n-grams.
    DiceSorensen,
    /// Jaccard over n-gram sets.
    Jaccard,
    /// Cologne Phonetic code equality.
    ColognePhonetic,
    /// Soundex code equality.
    Soundex,
}

impl Default for SimilarityAlgorithm {
    fn default() -> Self {
        Self::JaroWinkler
    }
}

/// Tuning knobs for similarity scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityOptions {
    /// Jaro-Winkler prefix scale (default 0.1, capped at 0.25).
    pub prefix_scale: f64,
    /// n-gram size for Dice and Jaccard (default 2).
    pub ngram: usize,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            prefix_scale: 0.1,
            ngram: 2,
        }
    }
}

/// Scores two strings in `[0, 1]` under the selected algorithm.
#[must_use]
pub fn similarity(
    algorithm: SimilarityAlgorithm,
    options: &SimilarityOptions,
    left: &str,
    right: &str,
) -> f64 {
    match algorithm {
        SimilarityAlgorithm::Levenshtein => strsim::normalized_levenshtein(left, right),
        SimilarityAlgorithm::Jaro => strsim::jaro(left, right),
        SimilarityAlgorithm::JaroWinkler => {
            jaro_winkler(left, right, options.prefix_scale.clamp(0.0, MAX_PREFIX_SCALE))
        }
        SimilarityAlgorithm::DiceSorensen => ngram_dice(left, right, options.ngram.max(1)),
        SimilarityAlgorithm::Jaccard => ngram_jaccard(left, right, options.ngram.max(1)),
        SimilarityAlgorithm::ColognePhonetic => {
            let (a, b) = (cologne_phonetic(left), cologne_phonetic(right));
            if !a.is_empty() && a == b { 1.0 } else { 0.0 }
        }
        SimilarityAlgorithm::Soundex => {
            let (a, b) = (soundex(left), soundex(right));
            if !a.is_empty() && a == b { 1.0 } else { 0.0 }
        }
    }
}

/// Jaro-Winkler with an explicit prefix scale.
fn jaro_winkler(left: &str, right: &str, prefix_scale: f64) -> f64 {
    let jaro = strsim::jaro(left, right);
    let prefix = left
        .chars()
        .zip(right.chars())
        .take(4)
        .take_while(|(a, b)| a == b)
        .count();
    // Winkler boost: reward shared prefixes without exceeding 1.0.
    (prefix as f64).mul_add(prefix_scale * (1.0 - jaro), jaro).min(1.0)
}

/// Builds the n-gram multiset of a string.
fn ngrams(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        if chars.is_empty() {
            return Vec::new();
        }
        return vec![chars.iter().collect()];
    }
    chars.windows(n).map(|window| window.iter().collect()).collect()
}

/// Sørensen-Dice coefficient over n-gram sets.
fn ngram_dice(left: &str, right: &str, n: usize) -> f64 {
    let left_set: BTreeSet<String> = ngrams(left, n).into_iter().collect();
    let right_set: BTreeSet<String> = ngrams(right, n).into_iter().collect();
    if left_set.is_empty() && right_set.is_empty() {
        return 1.0;
    }
    if left_set.is_empty() || right_set.is_empty() {
        return 0.0;
    }
    let shared = left_set.intersection(&right_set).count();
    (2.0 * shared as f64) / (left_set.len() + right_set.len()) as f64
}

/// Jaccard index over n-gram sets.
fn ngram_jaccard(left: &str, right: &str, n: usize) -> f64 {
    let left_set: BTreeSet<String> = ngrams(left, n).into_iter().collect();
    let right_set: BTreeSet<String> = ngrams(right, n).into_iter().collect();
    if left_set.is_empty() && right_set.is_empty() {
        return 1.0;
    }
    let union = left_set.union(&right_set).count();
    if union == 0 {
        return 0.0;
    }
    let shared = left_set.intersection(&right_set).count();
    shared as f64 / union as f64
}

// ============================================================================
// SECTION: Phonetic Encodings
// ============================================================================

/// American Soundex code (letter plus three digits).
#[must_use]
pub fn soundex(text: &str) -> String {
    let letters: Vec<char> = text
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };

    let digit = |ch: char| -> Option<char> {
        match ch {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    };

    let mut code = String::new();
    code.push(first);
    let mut previous = digit(first);
    for &letter in &letters[1..] {
        let current = digit(letter);
        match letter {
            // H and W do not separate identical codes.
            'H' | 'W' => continue,
            _ => {}
        }
        if let Some(current_digit) = current {
            if previous != Some(current_digit) {
                code.push(current_digit);
                if code.len() == 4 {
                    break;
                }
            }
        }
        previous = current;
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

/// Cologne Phonetic (Kölner Phonetik) code.
#[must_use]
pub fn cologne_phonetic(text: &str) -> String {
    let letters: Vec<char> = text
        .chars()
        .filter(|ch| ch.is_alphabetic())
        .map(|ch| match ch.to_uppercase().next().unwrap_or(ch) {
            'Ä' => 'A',
            'Ö' => 'O',
            'Ü' => 'U',
            'ß' => 'S',
            upper => upper,
        })
        .collect();

    let mut raw = String::new();
    for (index, &letter) in letters.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| letters[i]);
        let next = letters.get(index + 1).copied();
        let code: &str = match letter {
            'A' | 'E' | 'I' | 'J' | 'O' | 'U' | 'Y' => "0",
            'H' => "",
            'B' => "1",
            'P' => {
                if next == Some('H') {
                    "3"
                } else {
                    "1"
                }
            }
            'D' | 'T' => {
                if matches!(next, Some('C' | 'S' | 'Z')) {
                    "8"
                } else {
                    "2"
                }
            }
            'F' | 'V' | 'W' => "3",
            'G' | 'K' | 'Q' => "4",
            'C' => {
                if matches!(previous, Some('S' | 'Z')) {
                    "8"
                } else if index == 0 {
                    if matches!(next, Some('A' | 'H' | 'K' | 'L' | 'O' | 'Q' | 'R' | 'U' | 'X')) {
                        "4"
                    } else {
                        "8"
                    }
                } else if matches!(next, Some('A' | 'H' | 'K' | 'O' | 'Q' | 'U' | 'X')) {
                    "4"
                } else {
                    "8"
                }
            }
            'X' => {
                if matches!(previous, Some('C' | 'K' | 'Q')) {
                    "8"
                } else {
                    "48"
                }
            }
            'L' => "5",
            'M' | 'N' => "6",
            'R' => "7",
            'S' | 'Z' => "8",
            _ => "",
        };
        raw.push_str(code);
    }

    // Collapse runs, then drop every '0' except a leading one.
    let mut collapsed = String::new();
    let mut last: Option<char> = None;
    for ch in raw.chars() {
        if last != Some(ch) {
            collapsed.push(ch);
        }
        last = Some(ch);
    }
    let mut result = String::new();
    for (index, ch) in collapsed.chars().enumerate() {
        if ch == '0' && index > 0 {
            continue;
        }
        result.push(ch);
    }
    result
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
        reason = "Test-only assertions on deterministic scores."
    )]

    use super::SimilarityAlgorithm;
    use super::SimilarityOptions;
    use super::cologne_phonetic;
    use super::similarity;
    use super::soundex;

    #[test]
    fn identical_strings_score_one() {
        let options = SimilarityOptions::default();
        for algorithm in [
            SimilarityAlgorithm::Levenshtein,
            SimilarityAlgorithm::Jaro,
            SimilarityAlgorithm::JaroWinkler,
            SimilarityAlgorithm::DiceSorensen,
            SimilarityAlgorithm::Jaccard,
            SimilarityAlgorithm::ColognePhonetic,
            SimilarityAlgorithm::Soundex,
        ] {
            assert_eq!(similarity(algorithm, &options, "martha", "martha"), 1.0);
        }
    }

    #[test]
    fn jaro_winkler_prefix_boost_is_capped() {
        let default = SimilarityOptions::default();
        let boosted = SimilarityOptions {
            prefix_scale: 0.9,
            ngram: 2,
        };
        let base = similarity(SimilarityAlgorithm::JaroWinkler, &default, "martha", "marhta");
        let capped = similarity(SimilarityAlgorithm::JaroWinkler, &boosted, "martha", "marhta");
        assert!(base > similarity(SimilarityAlgorithm::Jaro, &default, "martha", "marhta"));
        assert!(capped <= 1.0);
    }

    #[test]
    fn soundex_matches_classic_vectors() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Ashcraft"), "A261");
        assert_eq!(soundex("Tymczak"), "T522");
    }

    #[test]
    fn cologne_phonetic_matches_reference_vectors() {
        assert_eq!(cologne_phonetic("Müller-Lüdenscheidt"), "65752682");
        assert_eq!(cologne_phonetic("Breschnew"), "17863");
        assert_eq!(cologne_phonetic("Wikipedia"), "3412");
    }

    #[test]
    fn dice_and_jaccard_degrade_with_divergence() {
        let options = SimilarityOptions::default();
        let close = similarity(SimilarityAlgorithm::DiceSorensen, &options, "night", "nacht");
        let far = similarity(SimilarityAlgorithm::DiceSorensen, &options, "night", "zzzzz");
        assert!(close > far);
        assert_eq!(far, 0.0);
        let jaccard = similarity(SimilarityAlgorithm::Jaccard, &options, "night", "night");
        assert_eq!(jaccard, 1.0);
    }
}
