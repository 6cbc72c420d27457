// crates/datatrust-core/tests/policy_engine.rs
// ============================================================================
// Module: Policy Engine Tests
// Description: Validate the decision pipeline end to end.
// Purpose: Ensure listing precedence, rule scans, and approval gating hold.
// ============================================================================

//! Decision-pipeline behavior tests for the pure policy evaluator.

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

use datatrust_core::WriteMode;
use datatrust_core::policy::MaskingPolicy;
use datatrust_core::policy::Policy;
use datatrust_core::policy::PolicyAction;
use datatrust_core::policy::PolicyRule;
use datatrust_core::policy::RuleWhen;
use datatrust_core::policy::WriteGateMode;
use datatrust_core::policy::WritePolicy;
use datatrust_core::policy::engine::CompiledPolicy;
use datatrust_core::policy::engine::Identity;
use datatrust_core::policy::engine::PolicyRequest;
use datatrust_core::policy::engine::RequestSummary;
use datatrust_core::policy::engine::Verdict;
use datatrust_core::policy::engine::evaluate;
use datatrust_core::policy::matcher::MatcherSpec;

fn compile(policy: Policy) -> CompiledPolicy {
    CompiledPolicy::compile(policy).expect("policy compiles")
}

fn request<'a>(
    tool: &'a str,
    connectors: &'a [String],
    identity: &'a Identity,
    summary: &'a RequestSummary,
) -> PolicyRequest<'a> {
    PolicyRequest {
        tool,
        connectors,
        identity,
        summary,
        approval_token: None,
        break_glass: false,
    }
}

#[test]
fn deny_list_overrides_allow_list() {
    let policy = Policy {
        allow_tools: vec!["*".to_string()],
        deny_tools: vec!["write_records".to_string()],
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary::default();
    let connectors: Vec<String> = Vec::new();

    let verdict =
        evaluate(&compiled, &request("write_records", &connectors, &identity, &summary), None)
            .verdict;
    let Verdict::Deny {
        reason,
    } = verdict
    else {
        panic!("expected deny, got {verdict:?}");
    };
    assert!(reason.contains("write_records"));

    let verdict =
        evaluate(&compiled, &request("read_records", &connectors, &identity, &summary), None)
            .verdict;
    assert_eq!(verdict, Verdict::Allow);
}

#[test]
fn default_deny_with_empty_allow_lists_denies_every_tool() {
    let policy = Policy {
        default_action: PolicyAction::Deny,
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary::default();
    let connectors: Vec<String> = Vec::new();

    for tool in ["list_connectors", "read_records", "reconcile_records"] {
        let outcome = evaluate(&compiled, &request(tool, &connectors, &identity, &summary), None);
        assert!(
            matches!(outcome.verdict, Verdict::Deny { .. }),
            "tool {tool} should be denied"
        );
    }
}

#[test]
fn connector_listing_applies_to_every_requested_id() {
    let policy = Policy {
        deny_connectors: vec!["pg-*".to_string()],
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary::default();
    let connectors = vec!["csv-users".to_string(), "pg-invoices".to_string()];

    let outcome = evaluate(&compiled, &request("read_records", &connectors, &identity, &summary), None);
    let Verdict::Deny {
        reason,
    } = outcome.verdict
    else {
        panic!("expected deny");
    };
    assert!(reason.contains("pg-invoices"));
}

#[test]
fn first_matching_rule_wins_and_deny_reason_surfaces() {
    let policy = Policy {
        rules: vec![
            PolicyRule {
                id: "block-pii".to_string(),
                when: RuleWhen {
                    select_fields_any: Some(vec![MatcherSpec::Pattern("ssn".to_string())]),
                    ..RuleWhen::default()
                },
                action: PolicyAction::Deny,
                reason: Some("ssn reads are not permitted".to_string()),
                mask_fields: Vec::new(),
                require_approval: false,
            },
            PolicyRule {
                id: "catch-all".to_string(),
                when: RuleWhen::default(),
                action: PolicyAction::Allow,
                reason: None,
                mask_fields: vec!["email".to_string()],
                require_approval: false,
            },
        ],
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let connectors: Vec<String> = Vec::new();

    let pii = RequestSummary {
        select_fields: vec!["ssn".to_string()],
        ..RequestSummary::default()
    };
    let outcome = evaluate(&compiled, &request("read_records", &connectors, &identity, &pii), None);
    assert_eq!(outcome.matched_rule.as_deref(), Some("block-pii"));
    let Verdict::Deny {
        reason,
    } = outcome.verdict
    else {
        panic!("expected deny");
    };
    assert_eq!(reason, "ssn reads are not permitted");

    let plain = RequestSummary::default();
    let outcome = evaluate(&compiled, &request("read_records", &connectors, &identity, &plain), None);
    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(outcome.matched_rule.as_deref(), Some("catch-all"));
    assert!(outcome.mask.matches("email"));
}

#[test]
fn write_mode_predicate_requires_exact_match() {
    let policy = Policy {
        rules: vec![PolicyRule {
            id: "no-deletes".to_string(),
            when: RuleWhen {
                write_mode: Some(WriteMode::Update),
                ..RuleWhen::default()
            },
            action: PolicyAction::Deny,
            reason: Some("updates are frozen".to_string()),
            mask_fields: Vec::new(),
            require_approval: false,
        }],
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let connectors: Vec<String> = Vec::new();

    let update = RequestSummary {
        write_mode: Some(WriteMode::Update),
        ..RequestSummary::default()
    };
    let outcome = evaluate(&compiled, &request("write_records", &connectors, &identity, &update), None);
    assert!(matches!(outcome.verdict, Verdict::Deny { .. }));

    let insert = RequestSummary {
        write_mode: Some(WriteMode::Insert),
        ..RequestSummary::default()
    };
    let outcome = evaluate(&compiled, &request("write_records", &connectors, &identity, &insert), None);
    assert_eq!(outcome.verdict, Verdict::Allow);
}

#[test]
fn write_gate_deny_blocks_even_allowed_writes() {
    let policy = Policy {
        writes: WritePolicy {
            mode: WriteGateMode::Deny,
            ..WritePolicy::default()
        },
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary {
        write_mode: Some(WriteMode::Insert),
        ..RequestSummary::default()
    };
    let connectors: Vec<String> = Vec::new();

    let outcome =
        evaluate(&compiled, &request("write_records", &connectors, &identity, &summary), None);
    let Verdict::Deny {
        reason,
    } = outcome.verdict
    else {
        panic!("expected deny");
    };
    assert!(reason.contains("disabled"));
}

#[test]
fn approval_token_must_match_configured_value() {
    let policy = Policy {
        writes: WritePolicy {
            mode: WriteGateMode::RequireApproval,
            approval_token_env: Some("WRITE_TOK".to_string()),
            approval_hook: None,
        },
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary {
        write_mode: Some(WriteMode::Insert),
        record_count: 1,
        ..RequestSummary::default()
    };
    let connectors: Vec<String> = Vec::new();

    let mut wrong = request("write_records", &connectors, &identity, &summary);
    wrong.approval_token = Some("wrong");
    let outcome = evaluate(&compiled, &wrong, Some("s3cr3t"));
    let Verdict::Deny {
        reason,
    } = outcome.verdict
    else {
        panic!("expected deny");
    };
    assert!(reason.contains("approval"));

    let mut right = request("write_records", &connectors, &identity, &summary);
    right.approval_token = Some("s3cr3t");
    let outcome = evaluate(&compiled, &right, Some("s3cr3t"));
    assert_eq!(outcome.verdict, Verdict::Allow);
    assert_eq!(
        outcome.write_approved_by.map(|by| by.as_str()),
        Some("token")
    );
}

#[test]
fn hook_is_requested_when_token_is_absent() {
    let policy = Policy {
        writes: WritePolicy {
            mode: WriteGateMode::RequireApproval,
            approval_token_env: None,
            approval_hook: Some(datatrust_core::policy::ApprovalHookConfig {
                url: "https://approvals.internal/hook".to_string(),
                timeout_ms: 10_000,
            }),
        },
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary {
        write_mode: Some(WriteMode::Insert),
        ..RequestSummary::default()
    };
    let connectors: Vec<String> = Vec::new();

    let outcome =
        evaluate(&compiled, &request("write_records", &connectors, &identity, &summary), None);
    assert!(matches!(outcome.verdict, Verdict::NeedsHookApproval { .. }));
}

#[test]
fn break_glass_allows_but_keeps_masking() {
    let policy = Policy {
        default_action: PolicyAction::Deny,
        masking: MaskingPolicy {
            fields: vec!["email".to_string()],
            ..MaskingPolicy::default()
        },
        break_glass: datatrust_core::policy::BreakGlassPolicy {
            enabled: true,
        },
        ..Policy::default()
    };
    let compiled = compile(policy);
    let identity = Identity::default();
    let summary = RequestSummary::default();
    let connectors: Vec<String> = Vec::new();

    let mut req = request("read_records", &connectors, &identity, &summary);
    req.break_glass = true;
    let outcome = evaluate(&compiled, &req, None);
    assert_eq!(outcome.verdict, Verdict::Allow);
    assert!(outcome.break_glass);
    assert!(outcome.mask.matches("email"));

    // Disabled break-glass falls through to the normal pipeline.
    let policy = Policy {
        default_action: PolicyAction::Deny,
        ..Policy::default()
    };
    let compiled = compile(policy);
    let mut req = request("read_records", &connectors, &identity, &summary);
    req.break_glass = true;
    let outcome = evaluate(&compiled, &req, None);
    assert!(matches!(outcome.verdict, Verdict::Deny { .. }));
}

#[test]
fn tenant_overlay_prepends_rules_and_unions_masks() {
    let base = Policy {
        masking: MaskingPolicy {
            fields: vec!["email".to_string()],
            ..MaskingPolicy::default()
        },
        rules: vec![PolicyRule {
            id: "base-allow".to_string(),
            when: RuleWhen::default(),
            action: PolicyAction::Allow,
            reason: None,
            mask_fields: Vec::new(),
            require_approval: false,
        }],
        ..Policy::default()
    };
    let overlay = datatrust_core::policy::PolicyOverlay {
        rules: vec![PolicyRule {
            id: "tenant-deny".to_string(),
            when: RuleWhen {
                tool: Some(vec![MatcherSpec::Pattern("write_records".to_string())]),
                ..RuleWhen::default()
            },
            action: PolicyAction::Deny,
            reason: Some("tenant writes frozen".to_string()),
            mask_fields: Vec::new(),
            require_approval: false,
        }],
        mask_fields: vec!["phone".to_string()],
        ..datatrust_core::policy::PolicyOverlay::default()
    };

    let effective = base.with_overlay(&overlay);
    assert_eq!(effective.rules[0].id, "tenant-deny");
    assert!(effective.masking.fields.contains(&"phone".to_string()));
    assert!(effective.masking.fields.contains(&"email".to_string()));

    let compiled = compile(effective);
    let identity = Identity::default();
    let summary = RequestSummary::default();
    let connectors: Vec<String> = Vec::new();
    let outcome =
        evaluate(&compiled, &request("write_records", &connectors, &identity, &summary), None);
    assert_eq!(outcome.matched_rule.as_deref(), Some("tenant-deny"));
    assert!(matches!(outcome.verdict, Verdict::Deny { .. }));
}
