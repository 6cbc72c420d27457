// crates/datatrust-core/src/policy/mod.rs
// ============================================================================
// Module: DataTrust Policy Model
// Description: Declarative policy types for tool and connector gating.
// Purpose: Define the wire form the engine compiles and evaluates.
// Dependencies: serde, crate::connector
// ============================================================================

//! ## Overview
//! A policy is a declarative document: allow/deny tool and connector lists,
//! an ordered rule list, masking configuration, a write-approval gate, and a
//! break-glass switch. Tenants may carry an overlay that adjusts the base
//! policy for identities bound to that tenant. The engine in
//! [`engine`](crate::policy::engine) compiles and evaluates these types; this
//! module defines only data.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod decision;
pub mod engine;
pub mod matcher;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::connector::WriteMode;
use crate::masking::DEFAULT_REPLACEMENT;
use crate::policy::matcher::MatcherSpec;

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Action taken by a rule or by the default fall-through.
///
/// # Invariants
/// - Variants are stable for serialization and audit labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Permit the call.
    #[default]
    Allow,
    /// Reject the call.
    Deny,
}

impl PolicyAction {
    /// Returns a stable label for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Predicate block of a rule; every provided predicate must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleWhen {
    /// Tool name matchers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<Vec<MatcherSpec>>,
    /// Every request connector must match at least one matcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectors_all: Option<Vec<MatcherSpec>>,
    /// At least one request connector must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectors_any: Option<Vec<MatcherSpec>>,
    /// At least one selected field must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select_fields_any: Option<Vec<MatcherSpec>>,
    /// At least one filtered field must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_fields_any: Option<Vec<MatcherSpec>>,
    /// At least one record field must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_fields_any: Option<Vec<MatcherSpec>>,
    /// Authenticated subject matchers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Vec<MatcherSpec>>,
    /// Authenticated tenant matchers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Vec<MatcherSpec>>,
    /// At least one identity role must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles_any: Option<Vec<MatcherSpec>>,
    /// At least one identity scope must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_any: Option<Vec<MatcherSpec>>,
    /// Exact write mode required for the predicate to match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_mode: Option<WriteMode>,
}

/// Single policy rule evaluated in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    /// Rule identifier recorded in decisions.
    pub id: String,
    /// Predicate block.
    #[serde(default)]
    pub when: RuleWhen,
    /// Action taken when the predicate matches.
    pub action: PolicyAction,
    /// Reason surfaced to callers on deny.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Additional fields masked when this rule allows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mask_fields: Vec<String>,
    /// Whether an allow from this rule still requires write approval.
    #[serde(default)]
    pub require_approval: bool,
}

// ============================================================================
// SECTION: Masking, Writes, Break-Glass
// ============================================================================

/// Masking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaskingPolicy {
    /// Fields masked in every response.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Additional fields masked per connector id.
    #[serde(default)]
    pub per_connector: BTreeMap<String, Vec<String>>,
    /// Replacement value for masked fields.
    #[serde(default = "default_replacement")]
    pub replacement: String,
}

impl Default for MaskingPolicy {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            per_connector: BTreeMap::new(),
            replacement: default_replacement(),
        }
    }
}

/// Returns the default masking replacement.
fn default_replacement() -> String {
    DEFAULT_REPLACEMENT.to_string()
}

/// Write gate mode.
///
/// # Invariants
/// - Variants are stable for serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteGateMode {
    /// Writes follow list and rule evaluation only.
    #[default]
    Allow,
    /// All writes are denied.
    Deny,
    /// Writes require an approval token or hook approval.
    RequireApproval,
}

/// Approval hook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalHookConfig {
    /// Hook endpoint receiving the approval payload.
    pub url: String,
    /// Hook timeout in milliseconds.
    #[serde(default = "default_hook_timeout_ms")]
    pub timeout_ms: u64,
}

/// Returns the default approval hook timeout.
const fn default_hook_timeout_ms() -> u64 {
    10_000
}

/// Write-approval gate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WritePolicy {
    /// Gate mode.
    #[serde(default)]
    pub mode: WriteGateMode,
    /// Environment variable holding the static approval token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_token_env: Option<String>,
    /// Synchronous approval hook.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_hook: Option<ApprovalHookConfig>,
}

/// Break-glass override configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakGlassPolicy {
    /// Whether the break-glass header is honoured.
    #[serde(default)]
    pub enabled: bool,
}

// ============================================================================
// SECTION: Policy Document
// ============================================================================

/// Declarative policy document.
///
/// # Invariants
/// - Rule order is significant; the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Policy version string recorded in decisions.
    #[serde(default)]
    pub version: String,
    /// Action when no list or rule decides.
    #[serde(default = "default_action")]
    pub default_action: PolicyAction,
    /// Tools allowed (supports `*`).
    #[serde(default)]
    pub allow_tools: Vec<String>,
    /// Tools denied (supports `*`, takes precedence).
    #[serde(default)]
    pub deny_tools: Vec<String>,
    /// Connectors allowed (supports `*`).
    #[serde(default)]
    pub allow_connectors: Vec<String>,
    /// Connectors denied (supports `*`, takes precedence).
    #[serde(default)]
    pub deny_connectors: Vec<String>,
    /// Ordered rule list.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Masking configuration.
    #[serde(default)]
    pub masking: MaskingPolicy,
    /// Write-approval gate.
    #[serde(default)]
    pub writes: WritePolicy,
    /// Break-glass switch.
    #[serde(default)]
    pub break_glass: BreakGlassPolicy,
}

/// Returns the default fall-through action.
const fn default_action() -> PolicyAction {
    PolicyAction::Allow
}

/// Tenant overlay adjusting the base policy.
///
/// Lists replace the base when present; rules are prepended so tenant rules
/// win ties; masking fields are unioned; writes and break-glass replace the
/// base when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverlay {
    /// Replacement default action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_action: Option<PolicyAction>,
    /// Replacement allow-tools list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_tools: Option<Vec<String>>,
    /// Replacement deny-tools list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_tools: Option<Vec<String>>,
    /// Replacement allow-connectors list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_connectors: Option<Vec<String>>,
    /// Replacement deny-connectors list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_connectors: Option<Vec<String>>,
    /// Rules prepended to the base rule list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
    /// Masking fields unioned into the base set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mask_fields: Vec<String>,
    /// Replacement write gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<WritePolicy>,
    /// Replacement break-glass switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_glass: Option<BreakGlassPolicy>,
}

impl Policy {
    /// Produces the effective policy for a tenant overlay.
    #[must_use]
    pub fn with_overlay(&self, overlay: &PolicyOverlay) -> Self {
        let mut effective = self.clone();
        if let Some(action) = overlay.default_action {
            effective.default_action = action;
        }
        if let Some(tools) = &overlay.allow_tools {
            effective.allow_tools.clone_from(tools);
        }
        if let Some(tools) = &overlay.deny_tools {
            effective.deny_tools.clone_from(tools);
        }
        if let Some(connectors) = &overlay.allow_connectors {
            effective.allow_connectors.clone_from(connectors);
        }
        if let Some(connectors) = &overlay.deny_connectors {
            effective.deny_connectors.clone_from(connectors);
        }
        if !overlay.rules.is_empty() {
            let mut rules = overlay.rules.clone();
            rules.extend(effective.rules);
            effective.rules = rules;
        }
        for field in &overlay.mask_fields {
            if !effective.masking.fields.contains(field) {
                effective.masking.fields.push(field.clone());
            }
        }
        if let Some(writes) = &overlay.writes {
            effective.writes = writes.clone();
        }
        if let Some(break_glass) = &overlay.break_glass {
            effective.break_glass = break_glass.clone();
        }
        effective
    }
}
