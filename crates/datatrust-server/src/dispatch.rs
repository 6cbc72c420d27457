// crates/datatrust-server/src/dispatch.rs
// ============================================================================
// Module: Tool Dispatch Pipeline
// Description: Auth-to-audit orchestration around every tool invocation.
// Purpose: Decide, bound, execute, mask, and account for each call.
// Dependencies: datatrust-core, tokio, crate::{approval, context, policy_audit}
// ============================================================================

//! ## Overview
//! For every call the dispatcher: establishes the trace and decision
//! identifiers (inheriting a W3C `traceparent` when present), evaluates the
//! effective policy for the caller's tenant, persists the decision to the
//! hash-chained audit sink, acquires the global tool semaphore, bounds the
//! handler with the tool timeout, masks every record in the response, and
//! records metrics plus one structured log line. Denials return an error
//! response carrying the decision id.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use datatrust_core::CompiledPolicy;
use datatrust_core::DecisionCore;
use datatrust_core::DecisionId;
use datatrust_core::Identity;
use datatrust_core::MaskSet;
use datatrust_core::PolicyAction;
use datatrust_core::PolicyRequest;
use datatrust_core::RequestSummary;
use datatrust_core::Timestamp;
use datatrust_core::TraceId;
use datatrust_core::Verdict;
use datatrust_core::policy::engine::ApprovedBy;
use datatrust_core::policy::engine::evaluate;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Semaphore;

use datatrust_config::LogLevel;

use crate::approval::ApprovalDecider;
use crate::approval::ApprovalRequest;
use crate::context::TelemetryContext;
use crate::context::mint_decision_id;
use crate::context::mint_trace_id;
use crate::metrics::MetricsRegistry;
use crate::policy_audit::PolicyAuditSink;
use crate::telemetry::LogEvent;
use crate::telemetry::LogSink;
use crate::telemetry::ToolOutcome;
use crate::tools::ToolArgs;
use crate::tools::handlers;
use crate::tools::handlers::HandlerDeps;
use crate::tools::handlers::ToolError;

// ============================================================================
// SECTION: Requests and Responses
// ============================================================================

/// One inbound tool call with its transport context.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Tool name.
    pub tool: String,
    /// Raw JSON arguments.
    pub arguments: Value,
    /// Authenticated identity.
    pub identity: Identity,
    /// Whether the break-glass header matched.
    pub break_glass: bool,
    /// Inbound `traceparent` header, when present.
    pub traceparent: Option<String>,
    /// Remote peer address, when known.
    pub remote_ip: Option<String>,
}

/// Outbound tool response.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ToolResponse {
    /// Trace identifier.
    pub trace_id: TraceId,
    /// Policy decision identifier.
    pub policy_decision_id: DecisionId,
    /// Whether the payload describes an error.
    pub is_error: bool,
    /// Structured payload or `{ "text": ... }` report.
    #[serde(flatten)]
    pub payload: Value,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Tool dispatch pipeline.
pub struct Dispatcher {
    /// Handler dependencies (registry, snapshots, audit, comparators).
    deps: HandlerDeps,
    /// Compiled base policy.
    base_policy: CompiledPolicy,
    /// Compiled per-tenant effective policies.
    tenant_policies: BTreeMap<String, CompiledPolicy>,
    /// Resolved static approval token, when configured.
    approval_token_expected: Option<String>,
    /// Approval hook seam.
    approval: Arc<dyn ApprovalDecider>,
    /// Hash-chained policy decision sink.
    policy_audit: Arc<PolicyAuditSink>,
    /// Global tool semaphore.
    semaphore: Arc<Semaphore>,
    /// Tool timeout.
    tool_timeout: Duration,
    /// Metrics registry.
    metrics: Arc<MetricsRegistry>,
    /// Structured log sink.
    log: Arc<dyn LogSink>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    #[allow(clippy::too_many_arguments, reason = "Startup wiring happens once.")]
    #[must_use]
    pub fn new(
        deps: HandlerDeps,
        base_policy: CompiledPolicy,
        tenant_policies: BTreeMap<String, CompiledPolicy>,
        approval_token_expected: Option<String>,
        approval: Arc<dyn ApprovalDecider>,
        policy_audit: Arc<PolicyAuditSink>,
        tool_concurrency: usize,
        tool_timeout: Duration,
        metrics: Arc<MetricsRegistry>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            deps,
            base_policy,
            tenant_policies,
            approval_token_expected,
            approval,
            policy_audit,
            semaphore: Arc::new(Semaphore::new(tool_concurrency.max(1))),
            tool_timeout,
            metrics,
            log,
        }
    }

    /// Returns the policy version in effect.
    #[must_use]
    pub fn policy_version(&self) -> &str {
        self.base_policy.version()
    }

    /// Returns the handler dependencies for admin reporting.
    #[must_use]
    pub const fn deps(&self) -> &HandlerDeps {
        &self.deps
    }

    /// Returns the policy audit sink for admin reporting.
    #[must_use]
    pub fn policy_audit(&self) -> &PolicyAuditSink {
        &self.policy_audit
    }

    /// Resolves the compiled policy for a tenant.
    fn policy_for(&self, tenant: Option<&str>) -> &CompiledPolicy {
        tenant
            .and_then(|tenant| self.tenant_policies.get(tenant))
            .unwrap_or(&self.base_policy)
    }

    /// Dispatches one tool call end to end.
    pub async fn dispatch(&self, request: DispatchRequest) -> ToolResponse {
        let started = Instant::now();
        let trace_id = request
            .traceparent
            .as_deref()
            .and_then(TraceId::from_traceparent)
            .unwrap_or_else(mint_trace_id);
        let decision_id = mint_decision_id();
        let policy = self.policy_for(request.identity.tenant.as_deref());

        // Argument decoding happens before policy evaluation because the
        // request summary is derived from the decoded arguments.
        let args = match ToolArgs::parse(&request.tool, request.arguments.clone()) {
            Ok(args) => args,
            Err(message) => {
                let summary = RequestSummary::default();
                self.audit_decision(
                    &trace_id,
                    &decision_id,
                    &request,
                    &summary,
                    PolicyAction::Deny,
                    &message,
                    None,
                    false,
                    None,
                )
                .await;
                self.metrics.record_tool(&request.tool, ToolOutcome::Error, started.elapsed());
                return error_response(
                    trace_id,
                    decision_id,
                    &ToolError::new("VALIDATION_ERROR", message),
                );
            }
        };
        let connectors = args.connectors();
        let summary = args.summary();

        // Policy evaluation.
        let policy_request = PolicyRequest {
            tool: &request.tool,
            connectors: &connectors,
            identity: &request.identity,
            summary: &summary,
            approval_token: args.approval_token(),
            break_glass: request.break_glass,
        };
        let evaluation = evaluate(policy, &policy_request, self.approval_token_expected.as_deref());

        let (verdict, write_approved_by) = match evaluation.verdict.clone() {
            Verdict::NeedsHookApproval {
                hook,
            } => {
                let reply = self
                    .approval
                    .decide(
                        &hook,
                        &ApprovalRequest {
                            decision_id: decision_id.as_str().to_string(),
                            trace_id: trace_id.as_str().to_string(),
                            tool: request.tool.clone(),
                            connectors: connectors.clone(),
                            write_mode: summary.write_mode.map(|mode| mode.as_str().to_string()),
                            record_count: summary.record_count,
                            subject: request.identity.subject.clone(),
                            tenant: request.identity.tenant.clone(),
                        },
                    )
                    .await;
                if reply.allowed {
                    (Verdict::Allow, Some(ApprovedBy::Hook))
                } else {
                    let reason = reply
                        .reason
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "write approval was rejected".to_string());
                    (
                        Verdict::Deny {
                            reason,
                        },
                        None,
                    )
                }
            }
            other => (other, evaluation.write_approved_by),
        };

        // The decision is persisted before the response is produced.
        let (action, reason) = match &verdict {
            Verdict::Allow => (PolicyAction::Allow, String::new()),
            Verdict::Deny {
                reason,
            } => (PolicyAction::Deny, reason.clone()),
            Verdict::NeedsHookApproval {
                ..
            } => (PolicyAction::Deny, "approval pending".to_string()),
        };
        self.audit_decision(
            &trace_id,
            &decision_id,
            &request,
            &summary,
            action,
            &reason,
            evaluation.matched_rule.clone(),
            evaluation.break_glass,
            write_approved_by,
        )
        .await;

        if let Verdict::Deny {
            reason,
        } = verdict
        {
            self.metrics.record_tool(&request.tool, ToolOutcome::Denied, started.elapsed());
            self.log.log(LogEvent::new(
                LogLevel::Warn,
                "tool_denied",
                "policy denied tool call",
                json!({
                    "tool": request.tool,
                    "trace_id": trace_id,
                    "decision_id": decision_id,
                    "reason": reason,
                }),
            ));
            return error_response(
                trace_id,
                decision_id,
                &ToolError::new("PERMISSION_DENIED", reason),
            );
        }

        let ctx = TelemetryContext {
            trace_id: trace_id.clone(),
            tool: request.tool.clone(),
            connectors,
            decision_id: decision_id.clone(),
            mask: evaluation.mask.clone(),
            identity: request.identity.clone(),
            break_glass: evaluation.break_glass,
            remote_ip: request.remote_ip.clone(),
        };

        // Concurrency gate and tool timeout around the handler.
        let queue_start = Instant::now();
        let permit = self.semaphore.acquire().await;
        self.metrics.record_tool_queue_wait(&request.tool, queue_start.elapsed());
        let outcome = match permit {
            Err(_) => Err(ToolError::new("UNKNOWN", "server is shutting down")),
            Ok(_permit) => {
                match tokio::time::timeout(
                    self.tool_timeout,
                    handlers::run(&args, &self.deps, &ctx),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::new(
                        "TIMEOUT",
                        format!(
                            "tool `{}` timed out after {} ms",
                            request.tool,
                            self.tool_timeout.as_millis()
                        ),
                    )),
                }
            }
        };

        let duration = started.elapsed();
        match outcome {
            Ok(mut output) => {
                mask_value(&ctx.mask, &mut output.payload);
                let payload = match output.text {
                    Some(text) => json!({
                        "text": format!(
                            "{text}\ntrace_id: {trace_id}\npolicy_decision_id: {decision_id}"
                        ),
                    }),
                    None => output.payload,
                };
                self.metrics.record_tool(&request.tool, ToolOutcome::Ok, duration);
                self.log.log(LogEvent::new(
                    LogLevel::Info,
                    "tool_call",
                    "tool call completed",
                    json!({
                        "tool": request.tool,
                        "trace_id": trace_id,
                        "decision_id": decision_id,
                        "duration_ms": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                        "outcome": "ok",
                        "subject": ctx.identity.subject,
                        "break_glass": ctx.break_glass,
                    }),
                ));
                ToolResponse {
                    trace_id,
                    policy_decision_id: decision_id,
                    is_error: false,
                    payload,
                }
            }
            Err(error) => {
                self.metrics.record_tool(&request.tool, ToolOutcome::Error, duration);
                self.log.log(LogEvent::new(
                    LogLevel::Error,
                    "tool_call",
                    "tool call failed",
                    json!({
                        "tool": request.tool,
                        "trace_id": trace_id,
                        "decision_id": decision_id,
                        "duration_ms": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                        "outcome": "error",
                        "kind": error.kind,
                    }),
                ));
                error_response(trace_id, decision_id, &error)
            }
        }
    }

    /// Persists one decision record, best effort.
    #[allow(clippy::too_many_arguments, reason = "Decision records carry many fields.")]
    async fn audit_decision(
        &self,
        trace_id: &TraceId,
        decision_id: &DecisionId,
        request: &DispatchRequest,
        summary: &RequestSummary,
        decision: PolicyAction,
        reason: &str,
        matched_rule: Option<String>,
        break_glass: bool,
        write_approved_by: Option<ApprovedBy>,
    ) {
        let args = ToolArgs::parse(&request.tool, request.arguments.clone());
        let connectors = args.map(|args| args.connectors()).unwrap_or_default();
        let core = DecisionCore {
            decision_id: decision_id.clone(),
            trace_id: trace_id.clone(),
            policy_version: self.policy_version().to_string(),
            timestamp: Timestamp::now(),
            tool: request.tool.clone(),
            connectors,
            decision,
            reason: reason.to_string(),
            matched_rule,
            subject: request.identity.subject.clone(),
            tenant: request.identity.tenant.clone(),
            break_glass,
            write_approved_by,
            request: summary.clone(),
        };
        if let Err(err) = self.policy_audit.append(core).await {
            // Sink failures are logged and surfaced in status; the decision
            // itself is unaffected.
            self.log.log(LogEvent::new(
                LogLevel::Error,
                "policy_audit",
                "failed to persist policy decision",
                json!({"decision_id": decision_id, "error": err.to_string()}),
            ));
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an error response.
fn error_response(trace_id: TraceId, decision_id: DecisionId, error: &ToolError) -> ToolResponse {
    let mut payload = json!({
        "error": {
            "kind": error.kind,
            "message": error.message,
        },
    });
    if let Some(suggestion) = &error.suggestion
        && let Some(object) = payload.get_mut("error").and_then(Value::as_object_mut)
    {
        object.insert("suggestion".to_string(), json!(suggestion));
    }
    ToolResponse {
        trace_id,
        policy_decision_id: decision_id,
        is_error: true,
        payload,
    }
}

/// Masks matching keys anywhere in a payload value.
fn mask_value(mask: &MaskSet, value: &mut Value) {
    if mask.is_empty() {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if mask.matches(key) {
                    *nested = Value::String(mask.replacement().to_string());
                } else {
                    mask_value(mask, nested);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_value(mask, item);
            }
        }
        _ => {}
    }
}
