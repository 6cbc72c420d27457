// crates/datatrust-core/src/policy/matcher.rs
// ============================================================================
// Module: Policy Matchers
// Description: Literal, glob, and regex matchers for rule predicates.
// Purpose: Provide deterministic string matching for policy rule scans.
// Dependencies: regex, serde
// ============================================================================

//! ## Overview
//! A matcher is a literal string, a glob containing `*`, or an explicit
//! regex object. The literal `*` matches anything. Globs support `*` as a
//! multi-character wildcard only. Regex patterns are compiled once at policy
//! load; compilation failures surface as configuration errors, never as
//! silent non-matches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Matcher Specification
// ============================================================================

/// Wire form of a matcher: a bare string or a `{ "regex": ... }` object.
///
/// # Invariants
/// - Bare strings containing `*` are treated as globs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatcherSpec {
    /// Literal or glob pattern.
    Pattern(String),
    /// Explicit regular expression.
    Regex {
        /// Regular expression source.
        regex: String,
    },
}

/// Error raised when a matcher specification fails to compile.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid matcher regex `{pattern}`: {message}")]
pub struct MatcherError {
    /// Offending pattern source.
    pub pattern: String,
    /// Compiler diagnostic.
    pub message: String,
}

// ============================================================================
// SECTION: Compiled Matcher
// ============================================================================

/// Compiled matcher ready for evaluation.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Matches anything.
    Any,
    /// Exact string equality.
    Literal(String),
    /// Glob with `*` wildcards.
    Glob(String),
    /// Anchored regular expression.
    Regex(Regex),
}

impl Matcher {
    /// Compiles a matcher specification.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError`] when a regex pattern fails to compile.
    pub fn compile(spec: &MatcherSpec) -> Result<Self, MatcherError> {
        match spec {
            MatcherSpec::Pattern(pattern) if pattern == "*" => Ok(Self::Any),
            MatcherSpec::Pattern(pattern) if pattern.contains('*') => {
                Ok(Self::Glob(pattern.clone()))
            }
            MatcherSpec::Pattern(pattern) => Ok(Self::Literal(pattern.clone())),
            MatcherSpec::Regex {
                regex,
            } => {
                let compiled = Regex::new(regex).map_err(|err| MatcherError {
                    pattern: regex.clone(),
                    message: err.to_string(),
                })?;
                Ok(Self::Regex(compiled))
            }
        }
    }

    /// Returns true when the candidate matches.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(literal) => literal == candidate,
            Self::Glob(glob) => glob_matches(glob, candidate),
            Self::Regex(regex) => regex.is_match(candidate),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Literal(literal) => f.write_str(literal),
            Self::Glob(glob) => f.write_str(glob),
            Self::Regex(regex) => write!(f, "regex:{}", regex.as_str()),
        }
    }
}

/// Compiles a list of matcher specifications.
///
/// # Errors
///
/// Returns [`MatcherError`] on the first regex that fails to compile.
pub fn compile_all(specs: &[MatcherSpec]) -> Result<Vec<Matcher>, MatcherError> {
    specs.iter().map(Matcher::compile).collect()
}

/// Returns true when any matcher in the list matches the candidate.
#[must_use]
pub fn any_match(matchers: &[Matcher], candidate: &str) -> bool {
    matchers.iter().any(|matcher| matcher.matches(candidate))
}

// ============================================================================
// SECTION: Glob Evaluation
// ============================================================================

/// Iterative glob match where `*` matches any character sequence.
#[must_use]
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let mut p = 0;
    let mut c = 0;
    let mut star: Option<usize> = None;
    let mut star_c = 0;
    while c < candidate.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_c = c;
            p += 1;
        } else if p < pattern.len() && pattern[p] == candidate[c] {
            p += 1;
            c += 1;
        } else if let Some(star_p) = star {
            p = star_p + 1;
            star_c += 1;
            c = star_c;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
