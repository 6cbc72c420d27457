// crates/datatrust-core/src/policy/engine.rs
// ============================================================================
// Module: Policy Engine
// Description: Pure evaluator producing allow/deny/approval verdicts.
// Purpose: Decide every tool call deterministically from policy and context.
// Dependencies: subtle, crate::policy, crate::masking
// ============================================================================

//! ## Overview
//! The engine compiles a [`Policy`] once (regex matchers validated at load)
//! and evaluates requests without side effects. The decision pipeline is:
//! break-glass shortcut, deny/allow tool lists, deny/allow connector lists,
//! first-match rule scan, write-approval gate, default allow. The approval
//! hook is never called from here; a verdict of
//! [`Verdict::NeedsHookApproval`] instructs the dispatcher to consult its
//! approval seam and convert the reply into the final decision.
//!
//! ## Invariants
//! - Deny lists override allow lists; rule denies override the default.
//! - Every deny carries a non-empty reason.
//! - Identical inputs produce identical verdicts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use subtle::ConstantTimeEq;

use crate::connector::WriteMode;
use crate::masking::MaskSet;
use crate::policy::ApprovalHookConfig;
use crate::policy::Policy;
use crate::policy::PolicyAction;
use crate::policy::PolicyRule;
use crate::policy::RuleWhen;
use crate::policy::WriteGateMode;
use crate::policy::matcher::Matcher;
use crate::policy::matcher::MatcherError;
use crate::policy::matcher::MatcherSpec;
use crate::policy::matcher::any_match;
use crate::policy::matcher::compile_all;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tool name subject to the write-approval gate.
pub const WRITE_TOOL: &str = "write_records";

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Authenticated caller identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Subject claim or bearer principal.
    pub subject: Option<String>,
    /// Tenant claim.
    pub tenant: Option<String>,
    /// Granted roles.
    pub roles: Vec<String>,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

/// Tool-specific request summary consumed by rule predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestSummary {
    /// Write mode for `write_records` requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_mode: Option<WriteMode>,
    /// Projected field names.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub select_fields: Vec<String>,
    /// Filtered field names.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub where_fields: Vec<String>,
    /// Field names present in submitted records.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub record_fields: Vec<String>,
    /// Number of records in the request.
    pub record_count: u64,
}

/// Full policy evaluation request.
#[derive(Debug, Clone)]
pub struct PolicyRequest<'a> {
    /// Tool name.
    pub tool: &'a str,
    /// Connector ids touched by the request.
    pub connectors: &'a [String],
    /// Authenticated identity.
    pub identity: &'a Identity,
    /// Request summary.
    pub summary: &'a RequestSummary,
    /// Caller-supplied approval token.
    pub approval_token: Option<&'a str>,
    /// Whether the break-glass header matched the configured secret.
    pub break_glass: bool,
}

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// How a write was approved.
///
/// # Invariants
/// - Variants are stable for audit labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovedBy {
    /// Static approval token matched.
    Token,
    /// Approval hook allowed the write.
    Hook,
}

impl ApprovedBy {
    /// Returns a stable label for this approval path.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Hook => "hook",
        }
    }
}

/// Final or pending policy verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Request is allowed.
    Allow,
    /// Request is denied with a non-empty reason.
    Deny {
        /// Caller-visible denial reason.
        reason: String,
    },
    /// Request needs synchronous hook approval before it may proceed.
    NeedsHookApproval {
        /// Hook configuration the dispatcher must consult.
        hook: ApprovalHookConfig,
    },
}

/// Complete evaluation output.
///
/// # Invariants
/// - `mask` already folds global, per-connector, and rule mask fields.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Verdict for the request.
    pub verdict: Verdict,
    /// Identifier of the rule that decided, when one matched.
    pub matched_rule: Option<String>,
    /// Resolved mask set for response records.
    pub mask: MaskSet,
    /// Whether break-glass was honoured.
    pub break_glass: bool,
    /// Approval path taken for writes.
    pub write_approved_by: Option<ApprovedBy>,
}

// ============================================================================
// SECTION: Compiled Policy
// ============================================================================

/// Rule with compiled matchers.
struct CompiledRule {
    /// Source rule.
    rule: PolicyRule,
    /// Compiled predicate matchers, parallel to [`RuleWhen`].
    when: CompiledWhen,
}

/// Compiled predicate block.
#[derive(Default)]
struct CompiledWhen {
    /// Tool matchers.
    tool: Option<Vec<Matcher>>,
    /// All-connectors matchers.
    connectors_all: Option<Vec<Matcher>>,
    /// Any-connector matchers.
    connectors_any: Option<Vec<Matcher>>,
    /// Any-select-field matchers.
    select_fields_any: Option<Vec<Matcher>>,
    /// Any-where-field matchers.
    where_fields_any: Option<Vec<Matcher>>,
    /// Any-record-field matchers.
    record_fields_any: Option<Vec<Matcher>>,
    /// Subject matchers.
    subject: Option<Vec<Matcher>>,
    /// Tenant matchers.
    tenant: Option<Vec<Matcher>>,
    /// Any-role matchers.
    roles_any: Option<Vec<Matcher>>,
    /// Any-scope matchers.
    scopes_any: Option<Vec<Matcher>>,
    /// Required write mode.
    write_mode: Option<WriteMode>,
}

/// Policy compiled for evaluation.
///
/// # Invariants
/// - Every regex matcher compiled successfully at construction.
pub struct CompiledPolicy {
    /// Source policy document.
    policy: Policy,
    /// Compiled tool allow list.
    allow_tools: Vec<Matcher>,
    /// Compiled tool deny list.
    deny_tools: Vec<Matcher>,
    /// Compiled connector allow list.
    allow_connectors: Vec<Matcher>,
    /// Compiled connector deny list.
    deny_connectors: Vec<Matcher>,
    /// Compiled rules in declared order.
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    /// Compiles a policy document.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError`] when any regex matcher fails to compile.
    pub fn compile(policy: Policy) -> Result<Self, MatcherError> {
        let allow_tools = compile_list(&policy.allow_tools)?;
        let deny_tools = compile_list(&policy.deny_tools)?;
        let allow_connectors = compile_list(&policy.allow_connectors)?;
        let deny_connectors = compile_list(&policy.deny_connectors)?;
        let mut rules = Vec::with_capacity(policy.rules.len());
        for rule in &policy.rules {
            rules.push(CompiledRule {
                rule: rule.clone(),
                when: compile_when(&rule.when)?,
            });
        }
        Ok(Self {
            policy,
            allow_tools,
            deny_tools,
            allow_connectors,
            deny_connectors,
            rules,
        })
    }

    /// Returns the source policy document.
    #[must_use]
    pub const fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Returns the policy version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.policy.version
    }
}

/// Compiles a plain string list into matchers.
fn compile_list(entries: &[String]) -> Result<Vec<Matcher>, MatcherError> {
    let specs: Vec<MatcherSpec> =
        entries.iter().map(|entry| MatcherSpec::Pattern(entry.clone())).collect();
    compile_all(&specs)
}

/// Compiles a predicate block.
fn compile_when(when: &RuleWhen) -> Result<CompiledWhen, MatcherError> {
    Ok(CompiledWhen {
        tool: when.tool.as_deref().map(compile_all).transpose()?,
        connectors_all: when.connectors_all.as_deref().map(compile_all).transpose()?,
        connectors_any: when.connectors_any.as_deref().map(compile_all).transpose()?,
        select_fields_any: when.select_fields_any.as_deref().map(compile_all).transpose()?,
        where_fields_any: when.where_fields_any.as_deref().map(compile_all).transpose()?,
        record_fields_any: when.record_fields_any.as_deref().map(compile_all).transpose()?,
        subject: when.subject.as_deref().map(compile_all).transpose()?,
        tenant: when.tenant.as_deref().map(compile_all).transpose()?,
        roles_any: when.roles_any.as_deref().map(compile_all).transpose()?,
        scopes_any: when.scopes_any.as_deref().map(compile_all).transpose()?,
        write_mode: when.write_mode,
    })
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Evaluates a request against a compiled policy.
///
/// `expected_token` is the resolved value of `writes.approval_token_env`;
/// resolution from the process environment happens once at startup so the
/// evaluator itself stays pure.
#[must_use]
pub fn evaluate(
    compiled: &CompiledPolicy,
    request: &PolicyRequest<'_>,
    expected_token: Option<&str>,
) -> Evaluation {
    let policy = &compiled.policy;
    let mask = resolve_mask(policy, request.connectors, &[]);

    // Break-glass shortcut. Masking still applies; the override is audited.
    if request.break_glass && policy.break_glass.enabled {
        return Evaluation {
            verdict: Verdict::Allow,
            matched_rule: None,
            mask,
            break_glass: true,
            write_approved_by: None,
        };
    }

    // Tool listing: deny takes precedence, then allow, then default.
    if any_match(&compiled.deny_tools, request.tool) {
        return deny(format!("tool `{}` is denied by policy", request.tool), None, mask);
    }
    if !any_match(&compiled.allow_tools, request.tool)
        && policy.default_action == PolicyAction::Deny
    {
        return deny(format!("tool `{}` is not allowed by policy", request.tool), None, mask);
    }

    // Connector listing, applied per connector id in the request.
    for connector in request.connectors {
        if any_match(&compiled.deny_connectors, connector) {
            return deny(format!("connector `{connector}` is denied by policy"), None, mask);
        }
        if !any_match(&compiled.allow_connectors, connector)
            && policy.default_action == PolicyAction::Deny
        {
            return deny(format!("connector `{connector}` is not allowed by policy"), None, mask);
        }
    }

    // Rule scan: first matching rule wins.
    let mut matched_rule: Option<&CompiledRule> = None;
    for candidate in &compiled.rules {
        if when_matches(&candidate.when, request) {
            matched_rule = Some(candidate);
            break;
        }
    }

    let mut rule_mask_fields: &[String] = &[];
    let mut rule_requires_approval = false;
    let mut matched_rule_id = None;
    if let Some(candidate) = matched_rule {
        matched_rule_id = Some(candidate.rule.id.clone());
        match candidate.rule.action {
            PolicyAction::Deny => {
                let reason = candidate
                    .rule
                    .reason
                    .clone()
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| format!("denied by rule `{}`", candidate.rule.id));
                return deny(reason, matched_rule_id, mask);
            }
            PolicyAction::Allow => {
                rule_mask_fields = &candidate.rule.mask_fields;
                rule_requires_approval = candidate.rule.require_approval;
            }
        }
    }

    let mask = resolve_mask(policy, request.connectors, rule_mask_fields);

    // Write-approval gate, only for the write tool.
    let mut write_approved_by = None;
    if request.tool == WRITE_TOOL {
        match policy.writes.mode {
            WriteGateMode::Deny => {
                return deny("writes are disabled by policy".to_string(), matched_rule_id, mask);
            }
            WriteGateMode::RequireApproval | WriteGateMode::Allow => {}
        }
        let needs_approval =
            policy.writes.mode == WriteGateMode::RequireApproval || rule_requires_approval;
        if needs_approval {
            if token_approves(policy, request.approval_token, expected_token) {
                write_approved_by = Some(ApprovedBy::Token);
            } else if let Some(hook) = &policy.writes.approval_hook {
                return Evaluation {
                    verdict: Verdict::NeedsHookApproval {
                        hook: hook.clone(),
                    },
                    matched_rule: matched_rule_id,
                    mask,
                    break_glass: false,
                    write_approved_by: None,
                };
            } else {
                return deny(
                    "write requires approval and no valid approval token was supplied".to_string(),
                    matched_rule_id,
                    mask,
                );
            }
        }
    }

    Evaluation {
        verdict: Verdict::Allow,
        matched_rule: matched_rule_id,
        mask,
        break_glass: false,
        write_approved_by,
    }
}

/// Builds a deny evaluation with a non-empty reason.
fn deny(reason: String, matched_rule: Option<String>, mask: MaskSet) -> Evaluation {
    Evaluation {
        verdict: Verdict::Deny {
            reason,
        },
        matched_rule,
        mask,
        break_glass: false,
        write_approved_by: None,
    }
}

/// Resolves the mask set from global, per-connector, and rule fields.
fn resolve_mask(policy: &Policy, connectors: &[String], rule_fields: &[String]) -> MaskSet {
    let mut mask = MaskSet::new(&policy.masking.fields, policy.masking.replacement.clone());
    for connector in connectors {
        if let Some(fields) = policy.masking.per_connector.get(connector) {
            mask.extend(&MaskSet::new(fields, policy.masking.replacement.clone()));
        }
    }
    mask.extend(&MaskSet::new(rule_fields, policy.masking.replacement.clone()));
    mask
}

/// Constant-time approval-token check.
fn token_approves(policy: &Policy, supplied: Option<&str>, expected: Option<&str>) -> bool {
    if policy.writes.approval_token_env.is_none() {
        return false;
    }
    let (Some(supplied), Some(expected)) = (supplied, expected) else {
        return false;
    };
    if supplied.len() != expected.len() {
        return false;
    }
    supplied.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Evaluates a compiled predicate block; every provided predicate must match.
fn when_matches(when: &CompiledWhen, request: &PolicyRequest<'_>) -> bool {
    if let Some(matchers) = &when.tool
        && !any_match(matchers, request.tool)
    {
        return false;
    }
    if let Some(matchers) = &when.connectors_all
        && !request.connectors.iter().all(|connector| any_match(matchers, connector))
    {
        return false;
    }
    if let Some(matchers) = &when.connectors_any
        && !request.connectors.iter().any(|connector| any_match(matchers, connector))
    {
        return false;
    }
    if let Some(matchers) = &when.select_fields_any
        && !request.summary.select_fields.iter().any(|field| any_match(matchers, field))
    {
        return false;
    }
    if let Some(matchers) = &when.where_fields_any
        && !request.summary.where_fields.iter().any(|field| any_match(matchers, field))
    {
        return false;
    }
    if let Some(matchers) = &when.record_fields_any
        && !request.summary.record_fields.iter().any(|field| any_match(matchers, field))
    {
        return false;
    }
    if let Some(matchers) = &when.subject {
        let Some(subject) = &request.identity.subject else {
            return false;
        };
        if !any_match(matchers, subject) {
            return false;
        }
    }
    if let Some(matchers) = &when.tenant {
        let Some(tenant) = &request.identity.tenant else {
            return false;
        };
        if !any_match(matchers, tenant) {
            return false;
        }
    }
    if let Some(matchers) = &when.roles_any
        && !request.identity.roles.iter().any(|role| any_match(matchers, role))
    {
        return false;
    }
    if let Some(matchers) = &when.scopes_any
        && !request.identity.scopes.iter().any(|scope| any_match(matchers, scope))
    {
        return false;
    }
    if let Some(required) = when.write_mode
        && request.summary.write_mode != Some(required)
    {
        return false;
    }
    true
}
