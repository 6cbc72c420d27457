// crates/datatrust-server/src/bootstrap.rs
// ============================================================================
// Module: Server Bootstrap
// Description: Build the process-wide runtime from validated configuration.
// Purpose: Wire connectors, governance, policy, sinks, and dispatch once.
// Dependencies: datatrust-config, datatrust-connectors, datatrust-governance
// ============================================================================

//! ## Overview
//! Bootstrap turns a validated [`Config`] into the running state: built-in
//! factories construct csv/json/memory connectors, each wrapped in
//! governance; external adapters (excel, odoo, hubspot, SQL drivers) plug
//! in through the [`ConnectorFactory`] seam. Process-wide state (policy,
//! audit sinks, metrics, health) is initialized here, before any transport
//! starts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use datatrust_config::Config;
use datatrust_config::ConnectorEntry;
use datatrust_connectors::ConnectorRegistry;
use datatrust_connectors::CsvFormat;
use datatrust_connectors::FileConnector;
use datatrust_connectors::FileOptions;
use datatrust_connectors::FileStore;
use datatrust_connectors::JsonFormat;
use datatrust_connectors::MemoryConnector;
use datatrust_connectors::MemoryOptions;
use datatrust_core::CompiledPolicy;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::Record;
use datatrust_governance::BreakerConfig;
use datatrust_governance::GovernanceConfig;
use datatrust_governance::Governed;
use datatrust_governance::HealthRegistry;
use datatrust_governance::RetryConfig;
use datatrust_trust::AuditLogger;
use datatrust_trust::ComparatorRegistry;
use datatrust_trust::SnapshotStore;
use serde_json::json;

use datatrust_config::LogLevel;

use crate::approval::ApprovalDecider;
use crate::approval::HttpApprovalDecider;
use crate::auth::Authenticator;
use crate::dispatch::Dispatcher;
use crate::metrics::MetricsRegistry;
use crate::policy_audit::PolicyAuditSink;
use crate::rate_limit::RateLimiter;
use crate::telemetry::LogEvent;
use crate::telemetry::LogSink;
use crate::tools::handlers::HandlerDeps;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal startup failure.
#[derive(Debug, thiserror::Error)]
#[error("startup failed: {0}")]
pub struct BootstrapError(pub String);

// ============================================================================
// SECTION: Factory Seam
// ============================================================================

/// Seam for externally supplied connector adapters.
pub trait ConnectorFactory: Send + Sync {
    /// Builds a connector for an entry this factory understands.
    ///
    /// Returns `None` when the entry's type is not handled by this factory.
    fn build(&self, entry: &ConnectorEntry) -> Option<Result<Arc<dyn Connector>, ConnectorError>>;
}

/// Built-in factory covering csv, json, and memory entries.
struct BuiltinFactory;

impl ConnectorFactory for BuiltinFactory {
    fn build(&self, entry: &ConnectorEntry) -> Option<Result<Arc<dyn Connector>, ConnectorError>> {
        let common = entry.common();
        let options = FileOptions {
            id: common.id.clone(),
            name: common.name.clone().unwrap_or_else(|| common.id.clone()),
            readonly: common.readonly,
            key_field: common.key_field.clone(),
        };
        match entry {
            ConnectorEntry::Csv {
                path,
                delimiter,
                sanitize_formulas,
                escape_char,
                ..
            } => {
                let format = CsvFormat {
                    delimiter: delimiter.as_bytes().first().copied().unwrap_or(b','),
                    sanitize_formulas: *sanitize_formulas,
                    escape_char: *escape_char,
                };
                Some(Ok(Arc::new(FileConnector::new(
                    options,
                    FileStore::new(path),
                    Box::new(format),
                ))))
            }
            ConnectorEntry::Json {
                path,
                records_path,
                pretty,
                ..
            } => {
                let format = match JsonFormat::new(records_path.as_deref(), *pretty) {
                    Ok(format) => format,
                    Err(err) => return Some(Err(err.with_connector(common.id.clone()))),
                };
                Some(Ok(Arc::new(FileConnector::new(
                    options,
                    FileStore::new(path),
                    Box::new(format),
                ))))
            }
            ConnectorEntry::Memory {
                seed, ..
            } => {
                let mut records = Vec::with_capacity(seed.len());
                for value in seed {
                    match Record::from_value(value.clone()) {
                        Ok(record) => records.push(record),
                        Err(err) => {
                            return Some(Err(ConnectorError::new(
                                ConnectorErrorKind::ConfigurationError,
                                format!("seed record rejected: {err}"),
                            )
                            .with_connector(common.id.clone())));
                        }
                    }
                }
                Some(Ok(Arc::new(MemoryConnector::new(MemoryOptions {
                    id: common.id.clone(),
                    name: common.name.clone().unwrap_or_else(|| common.id.clone()),
                    readonly: common.readonly,
                    key_field: common.key_field.clone(),
                    seed: records,
                }))))
            }
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Fully wired server runtime.
pub struct ServerRuntime {
    /// Tool dispatch pipeline.
    pub dispatcher: Arc<Dispatcher>,
    /// Connector registry.
    pub registry: Arc<ConnectorRegistry>,
    /// Metrics registry.
    pub metrics: Arc<MetricsRegistry>,
    /// Connector health registry.
    pub health: Arc<HealthRegistry>,
    /// Request authenticator.
    pub authenticator: Arc<Authenticator>,
    /// Rate limiter when configured.
    pub rate_limiter: Option<Arc<RateLimiter>>,
    /// Break-glass header name and resolved secret.
    pub break_glass: Option<(String, String)>,
    /// Structured log sink.
    pub log: Arc<dyn LogSink>,
}

/// Builds the runtime with the built-in connector factories.
///
/// # Errors
///
/// Returns [`BootstrapError`] for any fatal initialization failure.
pub async fn build_runtime(
    config: &Config,
    log: Arc<dyn LogSink>,
) -> Result<ServerRuntime, BootstrapError> {
    build_runtime_with_factories(config, log, &[]).await
}

/// Builds the runtime with additional external connector factories.
///
/// External factories are consulted before the built-ins, so a deployment
/// can supply SQL or SaaS adapters for the matching entry types.
///
/// # Errors
///
/// Returns [`BootstrapError`] for any fatal initialization failure.
pub async fn build_runtime_with_factories(
    config: &Config,
    log: Arc<dyn LogSink>,
    factories: &[&dyn ConnectorFactory],
) -> Result<ServerRuntime, BootstrapError> {
    let metrics = Arc::new(MetricsRegistry::new());
    let health = Arc::new(HealthRegistry::new());
    let runtime = &config.server.runtime;
    let governance = GovernanceConfig {
        max_concurrency: runtime.connector_concurrency,
        timeout_ms: runtime.connector_timeout_ms,
        retry: RetryConfig {
            max_attempts: runtime.retry_attempts,
            ..RetryConfig::default()
        },
        breaker: BreakerConfig {
            failure_threshold: runtime.breaker_failure_threshold,
            open_ms: runtime.breaker_open_ms,
        },
    };

    let builtin = BuiltinFactory;
    let mut registry = ConnectorRegistry::new();
    for entry in &config.connectors {
        let built = factories
            .iter()
            .find_map(|factory| factory.build(entry))
            .or_else(|| builtin.build(entry))
            .unwrap_or_else(|| {
                Err(ConnectorError::new(
                    ConnectorErrorKind::ConfigurationError,
                    format!(
                        "connector type `{}` has no adapter in this build",
                        entry.type_tag()
                    )
                    ,
                )
                .with_connector(entry.common().id.clone())
                .with_suggestion("register a ConnectorFactory for this type at startup"))
            });
        let connector = built.map_err(|err| BootstrapError(err.to_string()))?;
        let governed = Arc::new(Governed::new(
            connector,
            governance,
            Arc::clone(&metrics) as Arc<dyn datatrust_governance::GovernanceMetrics>,
            Arc::clone(&health),
        ));
        registry.insert(governed).map_err(|err| BootstrapError(err.to_string()))?;
    }
    let registry = Arc::new(registry);

    // Connect every connector; a failure degrades the connector instead of
    // aborting startup.
    for id in registry.ids() {
        if let Ok(connector) = registry.get(&id)
            && let Err(err) = connector.connect().await
        {
            log.log(LogEvent::new(
                LogLevel::Warn,
                "connector_connect",
                "connector failed to connect at startup",
                json!({"connector": id, "error": err.to_string()}),
            ));
        }
    }

    let base_policy = CompiledPolicy::compile(config.server.policy.clone())
        .map_err(|err| BootstrapError(format!("policy does not compile: {err}")))?;
    let mut tenant_policies = BTreeMap::new();
    for (tenant, overlay) in &config.server.tenants {
        let effective = config.server.policy.with_overlay(overlay);
        let compiled = CompiledPolicy::compile(effective).map_err(|err| {
            BootstrapError(format!("tenant `{tenant}` policy does not compile: {err}"))
        })?;
        tenant_policies.insert(tenant.clone(), compiled);
    }

    let approval_token_expected = config
        .server
        .policy
        .writes
        .approval_token_env
        .as_deref()
        .map(|env_name| {
            std::env::var(env_name).map_err(|_| {
                BootstrapError(format!("environment variable `{env_name}` is not set"))
            })
        })
        .transpose()?;

    let policy_audit = Arc::new(
        PolicyAuditSink::new(
            &config.server.audit.policy_dir,
            config.server.audit.max_file_bytes,
            config.server.audit.remote_url.clone(),
        )
        .map_err(|err| BootstrapError(err.to_string()))?,
    );
    let approval: Arc<dyn ApprovalDecider> = Arc::new(
        HttpApprovalDecider::new()
            .map_err(|err| BootstrapError(format!("approval client failed: {err}")))?,
    );

    let deps = HandlerDeps {
        registry: Arc::clone(&registry),
        snapshots: SnapshotStore::new(&config.server.snapshot_dir),
        op_audit: Arc::new(AuditLogger::new(
            &config.server.audit.operation_dir,
            config.server.audit.retention_days,
        )),
        comparators: ComparatorRegistry::with_builtins(),
    };

    let dispatcher = Arc::new(Dispatcher::new(
        deps,
        base_policy,
        tenant_policies,
        approval_token_expected,
        approval,
        policy_audit,
        runtime.tool_concurrency,
        Duration::from_millis(runtime.tool_timeout_ms),
        Arc::clone(&metrics),
        Arc::clone(&log),
    ));

    let authenticator = Arc::new(
        Authenticator::from_config(&config.server.http.auth)
            .map_err(|err| BootstrapError(err.to_string()))?,
    );
    let rate_limiter = config
        .server
        .http
        .rate_limit
        .clone()
        .map(|rate_limit| Arc::new(RateLimiter::new(rate_limit)));
    let break_glass = config
        .server
        .http
        .break_glass
        .as_ref()
        .map(|break_glass| {
            std::env::var(&break_glass.secret_env)
                .map(|secret| (break_glass.header.clone(), secret))
                .map_err(|_| {
                    BootstrapError(format!(
                        "environment variable `{}` is not set",
                        break_glass.secret_env
                    ))
                })
        })
        .transpose()?;

    Ok(ServerRuntime {
        dispatcher,
        registry,
        metrics,
        health,
        authenticator,
        rate_limiter,
        break_glass,
        log,
    })
}
