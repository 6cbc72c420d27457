// crates/datatrust-trust/src/reconcile/mod.rs
// ============================================================================
// Module: Reconciliation Engine
// Description: Greedy one-to-one record pairing under weighted rules.
// Purpose: Match records across two connectors and score the confidence.
// Dependencies: datatrust-core, regex, serde, time, crate::{loader, reconcile}
// ============================================================================

//! ## Overview
//! Each source record competes for the best unclaimed target under a rule
//! list. A rule matches iff both values are non-null and its operator
//! yields true; confidence is the matched-weight share scaled to 0–100. A
//! candidate is admissible only when every required rule matched and the
//! confidence clears `min_confidence`. Blocking (auto, configured, off)
//! bounds the candidate set; the `regex` operator is literal substring
//! unless `unsafe_regex` is set, with pattern and input length guards.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod blocking;
pub mod numeric;
pub mod similarity;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use datatrust_core::Connector;
use datatrust_core::FilterOptions;
use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_core::TrustError;
use datatrust_core::TrustErrorKind;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::loader::clamp_max_records;
use crate::loader::load_records;
use crate::loader::require_connected;
use crate::reconcile::blocking::AutoKeyField;
use crate::reconcile::blocking::BlockingConfig;
use crate::reconcile::blocking::auto_key;
use crate::reconcile::blocking::configured_key;
use crate::reconcile::numeric::coerce_number;
use crate::reconcile::similarity::MAX_SIMILARITY_INPUT;
use crate::reconcile::similarity::SimilarityAlgorithm;
use crate::reconcile::similarity::SimilarityOptions;
use crate::reconcile::similarity::similarity;

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Maximum regex pattern length accepted in unsafe mode.
pub const MAX_REGEX_PATTERN: usize = 200;

/// Maximum input length accepted by the regex operator.
pub const MAX_REGEX_INPUT: usize = 10_000;

/// Matching operator for a rule.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    /// Direct equality, optionally case-insensitive.
    Equals,
    /// Numeric equality within a tolerance.
    EqualsTolerance,
    /// Either string contains the other.
    Contains,
    /// Literal substring, or a compiled regex when `unsafe_regex` is set.
    Regex,
    /// String similarity above a threshold.
    Similarity,
    /// Date distance within a day window.
    DateRange,
}

/// Per-rule operator options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleOptions {
    /// Case-insensitive comparison for equals/contains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
    /// Numeric tolerance for equals_tolerance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Opt-in regex compilation for the regex operator.
    #[serde(default)]
    pub unsafe_regex: bool,
    /// Similarity algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<SimilarityAlgorithm>,
    /// Similarity threshold (default 0.85).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// n-gram size for dice/jaccard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ngram: Option<usize>,
    /// Jaro-Winkler prefix scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_scale: Option<f64>,
    /// Day window for date_range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range_days: Option<f64>,
}

/// One reconciliation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileRule {
    /// Rule name recorded in results.
    pub name: String,
    /// Source-side field.
    pub source_field: String,
    /// Target-side field.
    pub target_field: String,
    /// Matching operator.
    pub operator: RuleOperator,
    /// Weight from 1 to 100.
    pub weight: u32,
    /// Whether the rule must match for a pair to be admissible.
    #[serde(default)]
    pub required: bool,
    /// Operator options.
    #[serde(default)]
    pub options: RuleOptions,
}

/// Reconciliation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileOptions {
    /// Ordered rule list.
    pub rules: Vec<ReconcileRule>,
    /// Admissibility threshold on the 0–100 confidence scale.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Blocking configuration.
    #[serde(default)]
    pub blocking: BlockingConfig,
    /// Record bound; clamped to the absolute cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_records: Option<u64>,
}

/// Returns the default admissibility threshold.
const fn default_min_confidence() -> f64 {
    50.0
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Outcome of one rule on one candidate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Rule name.
    pub rule: String,
    /// Whether the rule matched.
    pub matched: bool,
}

/// One matched pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    /// Source record.
    pub source_record: Record,
    /// Target record.
    pub target_record: Record,
    /// Confidence on the 0–100 scale.
    pub confidence: f64,
    /// Per-rule outcomes.
    pub rule_results: Vec<RuleOutcome>,
}

/// Reconciliation summary counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Matched pairs.
    pub matched_count: u64,
    /// Source records left unmatched.
    pub unmatched_source_count: u64,
    /// Target records left unmatched.
    pub unmatched_target_count: u64,
    /// Mean confidence over matched pairs (0 when none).
    pub average_confidence: f64,
}

/// Full reconciliation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Source connector id.
    pub source_id: String,
    /// Target connector id.
    pub target_id: String,
    /// Summary counts.
    pub summary: ReconcileSummary,
    /// Matched pairs in source encounter order.
    pub matches: Vec<MatchPair>,
    /// Unmatched source records.
    pub unmatched_source: Vec<Record>,
    /// Unmatched target records.
    pub unmatched_target: Vec<Record>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Reconciles two connectors under a rule list.
///
/// # Errors
///
/// Returns [`TrustError`] for disconnected connectors, invalid rules or
/// options, or connector read failures.
pub async fn reconcile_connectors(
    source: &dyn Connector,
    target: &dyn Connector,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, TrustError> {
    require_connected(source, TrustErrorKind::SourceNotConnected)?;
    require_connected(target, TrustErrorKind::TargetNotConnected)?;
    validate_rules(options)?;

    let max_records = clamp_max_records(options.max_records);
    let source_records = load_records(source, &FilterOptions::default(), max_records).await?;
    let target_records = load_records(target, &FilterOptions::default(), max_records).await?;

    reconcile_records(
        &source.info().id,
        &target.info().id,
        &source_records,
        &target_records,
        options,
    )
}

/// Reconciles already-loaded record sets.
///
/// # Errors
///
/// Returns [`TrustError`] when the rules or options are invalid.
pub fn reconcile_records(
    source_id: &str,
    target_id: &str,
    source_records: &[Record],
    target_records: &[Record],
    options: &ReconcileOptions,
) -> Result<ReconcileReport, TrustError> {
    validate_rules(options)?;
    let total_weight: u64 = options.rules.iter().map(|rule| u64::from(rule.weight)).sum();

    // Candidate buckets by blocking key; None means full scan.
    let buckets = build_buckets(target_records, options);

    let mut claimed = vec![false; target_records.len()];
    let mut matches: Vec<MatchPair> = Vec::new();
    let mut matched_source = vec![false; source_records.len()];

    for (source_index, source_record) in source_records.iter().enumerate() {
        let candidates = candidate_indexes(source_record, target_records.len(), &buckets, options);
        let mut best: Option<(usize, f64, Vec<RuleOutcome>)> = None;
        for target_index in candidates {
            if claimed[target_index] {
                continue;
            }
            let target_record = &target_records[target_index];
            let mut outcomes = Vec::with_capacity(options.rules.len());
            let mut matched_weight: u64 = 0;
            let mut required_failed = false;
            for rule in &options.rules {
                let matched = rule_matches(rule, source_record, target_record);
                if matched {
                    matched_weight += u64::from(rule.weight);
                } else if rule.required {
                    required_failed = true;
                }
                outcomes.push(RuleOutcome {
                    rule: rule.name.clone(),
                    matched,
                });
            }
            if required_failed {
                continue;
            }
            let confidence = if total_weight == 0 {
                0.0
            } else {
                (matched_weight as f64 / total_weight as f64) * 100.0
            };
            if confidence < options.min_confidence {
                continue;
            }
            // Strictly-better scores win; ties keep the earliest candidate.
            if best.as_ref().is_none_or(|(_, best_score, _)| confidence > *best_score) {
                best = Some((target_index, confidence, outcomes));
            }
        }
        if let Some((target_index, confidence, rule_results)) = best {
            claimed[target_index] = true;
            matched_source[source_index] = true;
            matches.push(MatchPair {
                source_record: source_record.clone(),
                target_record: target_records[target_index].clone(),
                confidence,
                rule_results,
            });
        }
    }

    let unmatched_source: Vec<Record> = source_records
        .iter()
        .enumerate()
        .filter(|(index, _)| !matched_source[*index])
        .map(|(_, record)| record.clone())
        .collect();
    let unmatched_target: Vec<Record> = target_records
        .iter()
        .enumerate()
        .filter(|(index, _)| !claimed[*index])
        .map(|(_, record)| record.clone())
        .collect();

    let average_confidence = if matches.is_empty() {
        0.0
    } else {
        matches.iter().map(|pair| pair.confidence).sum::<f64>() / matches.len() as f64
    };

    Ok(ReconcileReport {
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        summary: ReconcileSummary {
            matched_count: matches.len() as u64,
            unmatched_source_count: unmatched_source.len() as u64,
            unmatched_target_count: unmatched_target.len() as u64,
            average_confidence,
        },
        matches,
        unmatched_source,
        unmatched_target,
    })
}

/// Validates the rule list and option bounds.
fn validate_rules(options: &ReconcileOptions) -> Result<(), TrustError> {
    if options.rules.is_empty() {
        return Err(TrustError::new(
            TrustErrorKind::InvalidOptions,
            "at least one reconciliation rule is required",
        ));
    }
    for rule in &options.rules {
        if rule.weight == 0 || rule.weight > 100 {
            return Err(TrustError::new(
                TrustErrorKind::InvalidRule,
                format!("rule `{}` weight must be between 1 and 100", rule.name),
            ));
        }
        if rule.source_field.is_empty() || rule.target_field.is_empty() {
            return Err(TrustError::new(
                TrustErrorKind::InvalidRule,
                format!("rule `{}` must name source and target fields", rule.name),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Candidate Selection
// ============================================================================

/// Target buckets plus the auto-key fields that produced them.
enum Buckets {
    /// No blocking; scan everything.
    Full,
    /// Auto keys from required equals rules.
    Auto {
        /// Key fields derived from the rules.
        fields: Vec<AutoKeyField>,
        /// Target indexes bucketed by key.
        buckets: BTreeMap<String, Vec<usize>>,
    },
    /// Configured single-field blocking.
    Configured {
        /// Target indexes bucketed by key.
        buckets: BTreeMap<String, Vec<usize>>,
    },
}

/// Builds candidate buckets for the configured blocking mode.
fn build_buckets(target_records: &[Record], options: &ReconcileOptions) -> Buckets {
    match &options.blocking {
        BlockingConfig::Off => Buckets::Full,
        BlockingConfig::Auto => {
            let fields: Vec<AutoKeyField> = options
                .rules
                .iter()
                .filter(|rule| rule.required && rule.operator == RuleOperator::Equals)
                .map(|rule| AutoKeyField {
                    source_field: rule.source_field.clone(),
                    target_field: rule.target_field.clone(),
                    case_insensitive: rule.options.case_insensitive.unwrap_or(false),
                })
                .collect();
            if fields.is_empty() {
                return Buckets::Full;
            }
            let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for (index, record) in target_records.iter().enumerate() {
                if let Some(key) = auto_key(record, &fields, false) {
                    buckets.entry(key).or_default().push(index);
                }
            }
            Buckets::Auto {
                fields,
                buckets,
            }
        }
        BlockingConfig::Configured {
            target_field,
            algorithm,
            ..
        } => {
            let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for (index, record) in target_records.iter().enumerate() {
                if let Some(value) = record.get(target_field)
                    && let Some(key) = configured_key(value, *algorithm)
                {
                    buckets.entry(key).or_default().push(index);
                }
            }
            Buckets::Configured {
                buckets,
            }
        }
    }
}

/// Returns the candidate target indexes for one source record.
fn candidate_indexes(
    source_record: &Record,
    target_len: usize,
    buckets: &Buckets,
    options: &ReconcileOptions,
) -> Vec<usize> {
    match buckets {
        Buckets::Full => (0..target_len).collect(),
        Buckets::Auto {
            fields,
            buckets,
        } => auto_key(source_record, fields, true)
            .and_then(|key| buckets.get(&key).cloned())
            .unwrap_or_default(),
        Buckets::Configured {
            buckets,
        } => {
            let BlockingConfig::Configured {
                source_field,
                algorithm,
                ..
            } = &options.blocking
            else {
                return (0..target_len).collect();
            };
            let bucket = source_record
                .get(source_field)
                .and_then(|value| configured_key(value, *algorithm))
                .and_then(|key| buckets.get(&key).cloned());
            // Configured mode falls back to a full scan on an empty bucket.
            bucket.unwrap_or_else(|| (0..target_len).collect())
        }
    }
}

// ============================================================================
// SECTION: Rule Evaluation
// ============================================================================

/// Evaluates one rule against a candidate pair.
fn rule_matches(rule: &ReconcileRule, source: &Record, target: &Record) -> bool {
    let (Some(source_value), Some(target_value)) =
        (source.get(&rule.source_field), target.get(&rule.target_field))
    else {
        return false;
    };
    if source_value.is_null() || target_value.is_null() {
        return false;
    }

    match rule.operator {
        RuleOperator::Equals => {
            if rule.options.case_insensitive.unwrap_or(false)
                && let (Some(a), Some(b)) = (source_value.as_str(), target_value.as_str())
            {
                return a.to_lowercase() == b.to_lowercase();
            }
            source_value == target_value
        }
        RuleOperator::EqualsTolerance => {
            let (Some(a), Some(b)) = (coerce_number(source_value), coerce_number(target_value))
            else {
                return false;
            };
            (a - b).abs() <= rule.options.tolerance.unwrap_or(0.0)
        }
        RuleOperator::Contains => {
            let (a, b) = (render_text(source_value), render_text(target_value));
            if rule.options.case_insensitive.unwrap_or(true) {
                let (a, b) = (a.to_lowercase(), b.to_lowercase());
                a.contains(&b) || b.contains(&a)
            } else {
                a.contains(&b) || b.contains(&a)
            }
        }
        RuleOperator::Regex => {
            let input = render_text(source_value);
            let pattern = render_text(target_value);
            if rule.options.unsafe_regex {
                if pattern.chars().count() > MAX_REGEX_PATTERN
                    || input.chars().count() > MAX_REGEX_INPUT
                {
                    return false;
                }
                Regex::new(&pattern).is_ok_and(|regex| regex.is_match(&input))
            } else {
                input.contains(&pattern)
            }
        }
        RuleOperator::Similarity => {
            let (a, b) = (render_text(source_value), render_text(target_value));
            if a.chars().count() > MAX_SIMILARITY_INPUT || b.chars().count() > MAX_SIMILARITY_INPUT
            {
                return false;
            }
            let algorithm = rule.options.algorithm.unwrap_or_default();
            let similarity_options = SimilarityOptions {
                prefix_scale: rule.options.prefix_scale.unwrap_or(0.1),
                ngram: rule.options.ngram.unwrap_or(2),
            };
            similarity(algorithm, &similarity_options, &a, &b)
                >= rule.options.threshold.unwrap_or(0.85)
        }
        RuleOperator::DateRange => {
            let (Some(a), Some(b)) = (epoch_millis(source_value), epoch_millis(target_value))
            else {
                return false;
            };
            let window = rule.options.date_range_days.unwrap_or(0.0) * 86_400_000.0;
            ((a - b) as f64).abs() <= window
        }
    }
}

/// Renders a value as comparison text.
fn render_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Extracts epoch milliseconds from date-like values.
fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => {
            if let Some(ts) = Timestamp::parse_rfc3339(text) {
                return Some(ts.as_millis());
            }
            // Date-only values anchor at UTC midnight.
            Timestamp::parse_rfc3339(&format!("{text}T00:00:00Z")).map(Timestamp::as_millis)
        }
        _ => None,
    }
}
