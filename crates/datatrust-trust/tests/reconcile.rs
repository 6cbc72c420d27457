// crates/datatrust-trust/tests/reconcile.rs
// ============================================================================
// Module: Reconciliation Tests
// Description: Validate pairing, confidence, and admissibility rules.
// Purpose: Pin the greedy matcher's observable behavior.
// ============================================================================

//! Reconciliation engine behavior tests over in-memory record sets.

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
    clippy::float_cmp,
    reason = "Test-only assertions and helpers are permitted."
)]

use datatrust_core::Record;
use datatrust_core::TrustErrorKind;
use datatrust_trust::ReconcileOptions;
use datatrust_trust::ReconcileRule;
use datatrust_trust::RuleOperator;
use datatrust_trust::reconcile::RuleOptions;
use datatrust_trust::reconcile::blocking::BlockingConfig;
use datatrust_trust::reconcile_records;
use serde_json::json;

fn records(values: &[serde_json::Value]) -> Vec<Record> {
    values.iter().map(|value| Record::from_value(value.clone()).unwrap()).collect()
}

fn rule(
    name: &str,
    field: &str,
    operator: RuleOperator,
    weight: u32,
    required: bool,
    options: RuleOptions,
) -> ReconcileRule {
    ReconcileRule {
        name: name.to_string(),
        source_field: field.to_string(),
        target_field: field.to_string(),
        operator,
        weight,
        required,
        options,
    }
}

fn options(rules: Vec<ReconcileRule>, min_confidence: f64) -> ReconcileOptions {
    ReconcileOptions {
        rules,
        min_confidence,
        blocking: BlockingConfig::Off,
        max_records: None,
    }
}

#[test]
fn identical_sets_match_fully_with_confidence_100() {
    let data = records(&[
        json!({"id": "A", "amount": 100.0}),
        json!({"id": "B", "amount": 50.0}),
    ]);
    let opts = options(
        vec![
            rule("id", "id", RuleOperator::Equals, 50, true, RuleOptions::default()),
            rule("amount", "amount", RuleOperator::Equals, 50, false, RuleOptions::default()),
        ],
        50.0,
    );
    let report = reconcile_records("src", "dst", &data, &data, &opts).unwrap();
    assert_eq!(report.summary.matched_count, 2);
    assert_eq!(report.summary.unmatched_source_count, 0);
    assert_eq!(report.summary.unmatched_target_count, 0);
    assert_eq!(report.summary.average_confidence, 100.0);
}

#[test]
fn tolerance_rule_gates_on_min_confidence() {
    let source = records(&[
        json!({"id": "A", "amount": 100.00}),
        json!({"id": "B", "amount": 50.00}),
    ]);
    let target = records(&[
        json!({"id": "A", "amount": 100.01}),
        json!({"id": "B", "amount": 49.90}),
    ]);
    let rules = vec![
        rule("id", "id", RuleOperator::Equals, 50, true, RuleOptions::default()),
        rule(
            "amount",
            "amount",
            RuleOperator::EqualsTolerance,
            50,
            false,
            RuleOptions {
                tolerance: Some(0.01),
                ..RuleOptions::default()
            },
        ),
    ];

    // min_confidence 50: both pairs admissible; A at 100, B at 50.
    let report = reconcile_records("s", "t", &source, &target, &options(rules.clone(), 50.0)).unwrap();
    assert_eq!(report.summary.matched_count, 2);
    let a = report
        .matches
        .iter()
        .find(|pair| pair.source_record.get("id") == Some(&json!("A")))
        .unwrap();
    assert_eq!(a.confidence, 100.0);
    let b = report
        .matches
        .iter()
        .find(|pair| pair.source_record.get("id") == Some(&json!("B")))
        .unwrap();
    assert_eq!(b.confidence, 50.0);

    // min_confidence 75: only A clears the bar.
    let report = reconcile_records("s", "t", &source, &target, &options(rules, 75.0)).unwrap();
    assert_eq!(report.summary.matched_count, 1);
    assert_eq!(report.matches[0].source_record.get("id"), Some(&json!("A")));
    assert_eq!(report.summary.unmatched_source_count, 1);
}

#[test]
fn failed_required_rule_is_inadmissible_regardless_of_weight() {
    let source = records(&[json!({"id": "A", "name": "Acme Corp"})]);
    let target = records(&[json!({"id": "Z", "name": "Acme Corp"})]);
    let opts = options(
        vec![
            rule("id", "id", RuleOperator::Equals, 1, true, RuleOptions::default()),
            rule("name", "name", RuleOperator::Equals, 100, false, RuleOptions::default()),
        ],
        10.0,
    );
    let report = reconcile_records("s", "t", &source, &target, &opts).unwrap();
    assert_eq!(report.summary.matched_count, 0);
    assert_eq!(report.summary.unmatched_source_count, 1);
    assert_eq!(report.summary.unmatched_target_count, 1);
}

#[test]
fn greedy_pairing_is_one_to_one_with_first_tie_winning() {
    let source = records(&[
        json!({"key": "k", "seq": 1}),
        json!({"key": "k", "seq": 2}),
    ]);
    let target = records(&[json!({"key": "k", "seq": 9})]);
    let opts = options(
        vec![rule("key", "key", RuleOperator::Equals, 10, true, RuleOptions::default())],
        50.0,
    );
    let report = reconcile_records("s", "t", &source, &target, &opts).unwrap();
    // The single target is claimed by the first source record.
    assert_eq!(report.summary.matched_count, 1);
    assert_eq!(report.matches[0].source_record.get("seq"), Some(&json!(1)));
    assert_eq!(report.summary.unmatched_source_count, 1);
}

#[test]
fn regex_operator_is_literal_unless_opted_in() {
    let source = records(&[json!({"ref": "INV-12345"})]);
    let target_literal = records(&[json!({"ref": "INV-123"})]);
    let literal = options(
        vec![rule("ref", "ref", RuleOperator::Regex, 10, false, RuleOptions::default())],
        50.0,
    );
    let report =
        reconcile_records("s", "t", &source, &target_literal, &literal).unwrap();
    assert_eq!(report.summary.matched_count, 1);

    // A regex-shaped target does not compile in safe mode.
    let target_pattern = records(&[json!({"ref": "^INV-\\d+$"})]);
    let report =
        reconcile_records("s", "t", &source, &target_pattern, &literal).unwrap();
    assert_eq!(report.summary.matched_count, 0);

    let unsafe_opts = options(
        vec![rule(
            "ref",
            "ref",
            RuleOperator::Regex,
            10,
            false,
            RuleOptions {
                unsafe_regex: true,
                ..RuleOptions::default()
            },
        )],
        50.0,
    );
    let report =
        reconcile_records("s", "t", &source, &target_pattern, &unsafe_opts).unwrap();
    assert_eq!(report.summary.matched_count, 1);
}

#[test]
fn oversized_regex_patterns_are_refused() {
    let source = records(&[json!({"ref": "abc"})]);
    let target = records(&[json!({"ref": "a".repeat(300)})]);
    let opts = options(
        vec![rule(
            "ref",
            "ref",
            RuleOperator::Regex,
            10,
            false,
            RuleOptions {
                unsafe_regex: true,
                ..RuleOptions::default()
            },
        )],
        50.0,
    );
    let report = reconcile_records("s", "t", &source, &target, &opts).unwrap();
    assert_eq!(report.summary.matched_count, 0);
}

#[test]
fn similarity_and_date_range_operators_match_near_values() {
    let source = records(&[json!({"name": "Jon Smith", "paid": "2026-02-01"})]);
    let target = records(&[json!({"name": "John Smith", "paid": "2026-02-03"})]);
    let opts = options(
        vec![
            rule(
                "name",
                "name",
                RuleOperator::Similarity,
                50,
                false,
                RuleOptions {
                    threshold: Some(0.85),
                    ..RuleOptions::default()
                },
            ),
            rule(
                "paid",
                "paid",
                RuleOperator::DateRange,
                50,
                false,
                RuleOptions {
                    date_range_days: Some(3.0),
                    ..RuleOptions::default()
                },
            ),
        ],
        100.0,
    );
    let report = reconcile_records("s", "t", &source, &target, &opts).unwrap();
    assert_eq!(report.summary.matched_count, 1);
    assert_eq!(report.matches[0].confidence, 100.0);
}

#[test]
fn auto_blocking_matches_the_full_scan_result() {
    let source = records(&[
        json!({"id": "A", "v": 1}),
        json!({"id": "B", "v": 2}),
        json!({"id": "C", "v": 3}),
    ]);
    let target = records(&[
        json!({"id": "B", "v": 2}),
        json!({"id": "A", "v": 1}),
    ]);
    let rules = vec![
        rule("id", "id", RuleOperator::Equals, 50, true, RuleOptions::default()),
        rule("v", "v", RuleOperator::Equals, 50, false, RuleOptions::default()),
    ];

    let full = reconcile_records("s", "t", &source, &target, &options(rules.clone(), 50.0)).unwrap();
    let blocked = reconcile_records(
        "s",
        "t",
        &source,
        &target,
        &ReconcileOptions {
            rules,
            min_confidence: 50.0,
            blocking: BlockingConfig::Auto,
            max_records: None,
        },
    )
    .unwrap();
    assert_eq!(full.summary.matched_count, blocked.summary.matched_count);
    assert_eq!(full.summary.unmatched_source_count, blocked.summary.unmatched_source_count);
}

#[test]
fn invalid_weight_is_an_invalid_rule_error() {
    let err = reconcile_records(
        "s",
        "t",
        &[],
        &[],
        &options(
            vec![rule("w", "x", RuleOperator::Equals, 0, false, RuleOptions::default())],
            50.0,
        ),
    )
    .unwrap_err();
    assert_eq!(err.kind, TrustErrorKind::InvalidRule);

    let err = reconcile_records("s", "t", &[], &[], &options(Vec::new(), 50.0)).unwrap_err();
    assert_eq!(err.kind, TrustErrorKind::InvalidOptions);
}
