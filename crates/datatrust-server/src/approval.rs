// crates/datatrust-server/src/approval.rs
// ============================================================================
// Module: Write Approval
// Description: Synchronous approval hook consulted for gated writes.
// Purpose: Let an external system approve or reject write_records calls.
// Dependencies: async-trait, reqwest, serde, datatrust-core
// ============================================================================

//! ## Overview
//! When the policy engine defers a write to the approval hook, the
//! dispatcher posts a JSON payload (decision id, trace id, tool,
//! connectors, write mode, record count, subject, tenant) and waits up to
//! the configured timeout. The hook's `{allowed, reason?}` reply governs
//! the decision; transport failures and timeouts fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use datatrust_core::policy::ApprovalHookConfig;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Payload posted to the approval hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    /// Policy decision identifier.
    pub decision_id: String,
    /// Trace identifier of the originating call.
    pub trace_id: String,
    /// Tool name (always `write_records`).
    pub tool: String,
    /// Connector ids in the request.
    pub connectors: Vec<String>,
    /// Write mode label.
    pub write_mode: Option<String>,
    /// Records in the batch.
    pub record_count: u64,
    /// Authenticated subject.
    pub subject: Option<String>,
    /// Authenticated tenant.
    pub tenant: Option<String>,
}

/// Reply returned by the approval hook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApprovalReply {
    /// Whether the write may proceed.
    pub allowed: bool,
    /// Reason surfaced to the caller on rejection.
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// SECTION: Decider Seam
// ============================================================================

/// Approval seam consulted by the dispatcher.
#[async_trait]
pub trait ApprovalDecider: Send + Sync {
    /// Decides one gated write.
    ///
    /// Transport failures must be reported as a rejection, never an allow.
    async fn decide(&self, hook: &ApprovalHookConfig, request: &ApprovalRequest) -> ApprovalReply;
}

/// HTTP approval decider posting to the configured hook.
pub struct HttpApprovalDecider {
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl HttpApprovalDecider {
    /// Creates a decider with a shared client.
    ///
    /// # Errors
    ///
    /// Returns the client build error.
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl ApprovalDecider for HttpApprovalDecider {
    async fn decide(&self, hook: &ApprovalHookConfig, request: &ApprovalRequest) -> ApprovalReply {
        let outcome = self
            .client
            .post(&hook.url)
            .timeout(Duration::from_millis(hook.timeout_ms))
            .json(request)
            .send()
            .await;
        let response = match outcome {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                return ApprovalReply {
                    allowed: false,
                    reason: Some(format!("approval hook returned status {}", response.status())),
                };
            }
            Err(err) => {
                let reason = if err.is_timeout() {
                    "approval hook timed out".to_string()
                } else {
                    "approval hook is unreachable".to_string()
                };
                return ApprovalReply {
                    allowed: false,
                    reason: Some(reason),
                };
            }
        };
        match response.json::<ApprovalReply>().await {
            Ok(reply) => reply,
            Err(_) => ApprovalReply {
                allowed: false,
                reason: Some("approval hook returned an invalid reply".to_string()),
            },
        }
    }
}

/// Decider that rejects every request; used when no hook is configured.
pub struct RejectingApprovalDecider;

#[async_trait]
impl ApprovalDecider for RejectingApprovalDecider {
    async fn decide(&self, _hook: &ApprovalHookConfig, _request: &ApprovalRequest) -> ApprovalReply {
        ApprovalReply {
            allowed: false,
            reason: Some("no approval decider is configured".to_string()),
        }
    }
}
