// crates/datatrust-server/src/lib.rs
// ============================================================================
// Module: DataTrust Server
// Description: Tool dispatch pipeline, transports, and audit sinks.
// Purpose: Broker policy-gated tool access to registered connectors.
// Dependencies: axum, datatrust-config, datatrust-connectors, datatrust-core,
// datatrust-governance, datatrust-trust, jsonwebtoken, reqwest, tokio
// ============================================================================

//! ## Overview
//! The server crate orchestrates every tool invocation: transports (stdio
//! or HTTP with optional mutual TLS) deliver framed calls, authentication
//! resolves the caller identity, the dispatcher evaluates policy and
//! persists hash-chained decisions, handlers consume governed connectors
//! and trust primitives, and responses come back masked and annotated with
//! the trace and decision identifiers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod approval;
pub mod auth;
pub mod bootstrap;
pub mod context;
pub mod dispatch;
pub mod metrics;
pub mod policy_audit;
pub mod rate_limit;
pub mod report;
pub mod server;
pub mod stdio;
pub mod telemetry;
pub mod tools;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use approval::ApprovalDecider;
pub use approval::ApprovalReply;
pub use approval::ApprovalRequest;
pub use auth::AuthError;
pub use auth::Authenticator;
pub use bootstrap::BootstrapError;
pub use bootstrap::ConnectorFactory;
pub use bootstrap::ServerRuntime;
pub use bootstrap::build_runtime;
pub use bootstrap::build_runtime_with_factories;
pub use context::TelemetryContext;
pub use dispatch::DispatchRequest;
pub use dispatch::Dispatcher;
pub use dispatch::ToolResponse;
pub use metrics::MetricsRegistry;
pub use policy_audit::PolicyAuditSink;
pub use rate_limit::RateLimiter;
pub use server::HttpState;
pub use server::build_router;
pub use server::serve;
pub use telemetry::CaptureLogSink;
pub use telemetry::LogEvent;
pub use telemetry::LogSink;
pub use telemetry::NoopLogSink;
pub use telemetry::StderrLogSink;
pub use tools::TOOL_NAMES;
