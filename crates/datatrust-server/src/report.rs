// crates/datatrust-server/src/report.rs
// ============================================================================
// Module: Text Reports
// Description: Preformatted text renderings of trust-primitive reports.
// Purpose: Give human operators a readable summary without JSON tooling.
// Dependencies: datatrust-trust
// ============================================================================

//! ## Overview
//! Text reports summarize the structured payloads: headline counts first,
//! then a bounded listing of notable rows. The dispatcher appends the trace
//! and decision identifiers as a footer to every text response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use datatrust_trust::ChangeReport;
use datatrust_trust::ComparisonReport;
use datatrust_trust::ReconcileReport;
use datatrust_trust::consistency::RecordStatus;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum detail rows listed per section.
const MAX_ROWS: usize = 50;

// ============================================================================
// SECTION: Renderers
// ============================================================================

/// Renders a comparison report as text.
#[must_use]
pub fn render_comparison(report: &ComparisonReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Consistency report: {} vs {}", report.source_id, report.target_id);
    let summary = &report.summary;
    let _ = writeln!(
        out,
        "  {} source / {} target records: {} match, {} differ, {} source-only, {} target-only",
        summary.source_count,
        summary.target_count,
        summary.match_count,
        summary.difference_count,
        summary.source_only,
        summary.target_only,
    );
    let mut listed = 0;
    for record in &report.records {
        if record.status == RecordStatus::Match {
            continue;
        }
        if listed == MAX_ROWS {
            let _ = writeln!(out, "  ... further rows elided");
            break;
        }
        listed += 1;
        match record.status {
            RecordStatus::SourceOnly => {
                let _ = writeln!(out, "  [source-only] key={}", record.key);
            }
            RecordStatus::TargetOnly => {
                let _ = writeln!(out, "  [target-only] key={}", record.key);
            }
            RecordStatus::Difference => {
                let fields: Vec<String> = record
                    .differences
                    .iter()
                    .map(|difference| {
                        format!(
                            "{}: {} -> {}",
                            difference.source_field,
                            difference.source_value,
                            difference.target_value
                        )
                    })
                    .collect();
                let _ = writeln!(out, "  [differs] key={} ({})", record.key, fields.join("; "));
            }
            RecordStatus::Match => {}
        }
    }
    out
}

/// Renders a change-detection report as text.
#[must_use]
pub fn render_changes(report: &ChangeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Change report for `{}` ({} mode): {} total",
        report.connector_id, report.mode, report.total
    );
    for (label, entries) in [
        ("added", &report.added),
        ("deleted", &report.deleted),
        ("modified", &report.modified),
    ] {
        let _ = writeln!(out, "  {label}: {}", entries.len());
        for entry in entries.iter().take(MAX_ROWS) {
            if entry.changed_fields.is_empty() {
                let _ = writeln!(out, "    key={}", entry.key);
            } else {
                let _ = writeln!(
                    out,
                    "    key={} fields=[{}]",
                    entry.key,
                    entry.changed_fields.join(", ")
                );
            }
        }
        if entries.len() > MAX_ROWS {
            let _ = writeln!(out, "    ... further rows elided");
        }
    }
    out
}

/// Renders a reconciliation report as text.
#[must_use]
pub fn render_reconcile(report: &ReconcileReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Reconciliation: {} vs {}", report.source_id, report.target_id);
    let summary = &report.summary;
    let _ = writeln!(
        out,
        "  {} matched (avg confidence {:.1}), {} unmatched source, {} unmatched target",
        summary.matched_count,
        summary.average_confidence,
        summary.unmatched_source_count,
        summary.unmatched_target_count,
    );
    for pair in report.matches.iter().take(MAX_ROWS) {
        let failed: Vec<&str> = pair
            .rule_results
            .iter()
            .filter(|outcome| !outcome.matched)
            .map(|outcome| outcome.rule.as_str())
            .collect();
        if failed.is_empty() {
            let _ = writeln!(out, "  [{:.1}] full rule match", pair.confidence);
        } else {
            let _ = writeln!(out, "  [{:.1}] failed rules: {}", pair.confidence, failed.join(", "));
        }
    }
    if report.matches.len() > MAX_ROWS {
        let _ = writeln!(out, "  ... further rows elided");
    }
    out
}
