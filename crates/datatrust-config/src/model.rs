// crates/datatrust-config/src/model.rs
// ============================================================================
// Module: Configuration Model
// Description: Root configuration object with strict validation.
// Purpose: Pin every deployable knob behind one typed document.
// Dependencies: datatrust-core, serde
// ============================================================================

//! ## Overview
//! The root document holds a connector list (discriminated by `type`) and an
//! optional server section covering transport, HTTP/TLS/auth, rate limits,
//! policy, tenant overlays, audit sinks, and runtime defaults. Unknown
//! fields are rejected everywhere; `validate` enforces the cross-field rules
//! deserialization cannot express.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use datatrust_core::Policy;
use datatrust_core::PolicyOverlay;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ConfigError;

// ============================================================================
// SECTION: Connector Entries
// ============================================================================

/// Fields shared by every connector entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorCommon {
    /// Unique connector identifier.
    pub id: String,
    /// Human-readable name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether writes are rejected.
    #[serde(default)]
    pub readonly: bool,
    /// Key field for update/upsert matching.
    #[serde(default)]
    pub key_field: Option<String>,
}

/// One connector entry, discriminated by `type`.
///
/// Serde cannot reject unknown keys here (`deny_unknown_fields` does not
/// compose with `flatten`), so [`check_entry_keys`] enforces strictness on
/// the raw document before deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorEntry {
    /// CSV file source.
    Csv {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// File path.
        path: String,
        /// Field delimiter (single ASCII character).
        #[serde(default = "default_delimiter")]
        delimiter: String,
        /// Whether to escape leading formula characters on write.
        #[serde(default = "default_true")]
        sanitize_formulas: bool,
        /// Escape character for formula-shaped cells.
        #[serde(default = "default_escape_char")]
        escape_char: char,
    },
    /// JSON file source.
    Json {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// File path.
        path: String,
        /// Dot-separated path to the record array.
        #[serde(default)]
        records_path: Option<String>,
        /// Whether to pretty-print on write.
        #[serde(default)]
        pretty: bool,
    },
    /// Excel workbook source (external adapter).
    Excel {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// File path.
        path: String,
        /// Worksheet name; defaults to the first sheet.
        #[serde(default)]
        sheet: Option<String>,
    },
    /// Odoo ERP source (external adapter).
    Odoo {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// Server URL.
        url: String,
        /// Database name.
        database: String,
        /// Login user.
        user: String,
        /// API key or password (use `${VAR}` substitution).
        api_key: String,
        /// Model name, e.g. `res.partner`.
        model: String,
    },
    /// HubSpot CRM source (external adapter).
    Hubspot {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// Private app token (use `${VAR}` substitution).
        access_token: String,
        /// Object type, e.g. `contacts`.
        object_type: String,
    },
    /// PostgreSQL source.
    Postgresql {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// Connection string (use `${VAR}` substitution for credentials).
        connection_string: String,
        /// Target table.
        table: String,
        /// Optional schema qualifier.
        #[serde(default)]
        schema: Option<String>,
    },
    /// MySQL source.
    Mysql {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// Connection string (use `${VAR}` substitution for credentials).
        connection_string: String,
        /// Target table.
        table: String,
    },
    /// In-process memory source.
    Memory {
        /// Shared fields.
        #[serde(flatten)]
        common: ConnectorCommon,
        /// Seed records as JSON objects.
        #[serde(default)]
        seed: Vec<Value>,
    },
}

impl ConnectorEntry {
    /// Returns the shared fields.
    #[must_use]
    pub const fn common(&self) -> &ConnectorCommon {
        match self {
            Self::Csv {
                common, ..
            }
            | Self::Json {
                common, ..
            }
            | Self::Excel {
                common, ..
            }
            | Self::Odoo {
                common, ..
            }
            | Self::Hubspot {
                common, ..
            }
            | Self::Postgresql {
                common, ..
            }
            | Self::Mysql {
                common, ..
            }
            | Self::Memory {
                common, ..
            } => common,
        }
    }

    /// Returns the type tag.
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Self::Csv {
                ..
            } => "csv",
            Self::Json {
                ..
            } => "json",
            Self::Excel {
                ..
            } => "excel",
            Self::Odoo {
                ..
            } => "odoo",
            Self::Hubspot {
                ..
            } => "hubspot",
            Self::Postgresql {
                ..
            } => "postgresql",
            Self::Mysql {
                ..
            } => "mysql",
            Self::Memory {
                ..
            } => "memory",
        }
    }
}

/// Keys shared by every connector entry.
const COMMON_ENTRY_KEYS: &[&str] = &["type", "id", "name", "readonly", "key_field"];

/// Returns the type-specific keys for a connector type tag.
fn type_specific_keys(type_tag: &str) -> Option<&'static [&'static str]> {
    match type_tag {
        "csv" => Some(&["path", "delimiter", "sanitize_formulas", "escape_char"]),
        "json" => Some(&["path", "records_path", "pretty"]),
        "excel" => Some(&["path", "sheet"]),
        "odoo" => Some(&["url", "database", "user", "api_key", "model"]),
        "hubspot" => Some(&["access_token", "object_type"]),
        "postgresql" => Some(&["connection_string", "table", "schema"]),
        "mysql" => Some(&["connection_string", "table"]),
        "memory" => Some(&["seed"]),
        _ => None,
    }
}

/// Rejects unknown keys in raw connector tables before deserialization.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] naming the first unknown key. Unknown
/// type tags pass through so deserialization reports them uniformly.
pub fn check_entry_keys(document: &toml::Value) -> Result<(), ConfigError> {
    let Some(entries) = document.get("connectors").and_then(toml::Value::as_array) else {
        return Ok(());
    };
    for entry in entries {
        let Some(table) = entry.as_table() else {
            continue;
        };
        let Some(type_tag) = table.get("type").and_then(toml::Value::as_str) else {
            continue;
        };
        let Some(specific) = type_specific_keys(type_tag) else {
            continue;
        };
        for key in table.keys() {
            if !COMMON_ENTRY_KEYS.contains(&key.as_str()) && !specific.contains(&key.as_str()) {
                return Err(ConfigError::Parse(format!(
                    "unknown field `{key}` in `{type_tag}` connector entry"
                )));
            }
        }
    }
    Ok(())
}

/// Returns the default CSV delimiter.
fn default_delimiter() -> String {
    ",".to_string()
}

/// Returns the default formula escape character.
const fn default_escape_char() -> char {
    '\''
}

/// Returns true, for serde defaults.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Server Section
// ============================================================================

/// Transport selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Newline-framed stdio.
    #[default]
    Stdio,
    /// HTTP(S) server.
    Http,
}

/// TLS configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM certificate chain file.
    pub cert_file: String,
    /// PEM private key file.
    pub key_file: String,
    /// Require and verify client certificates (mutual TLS).
    #[serde(default)]
    pub request_cert: bool,
    /// CA bundle for client certificate verification.
    #[serde(default)]
    pub ca_file: Option<String>,
}

/// Authentication mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No authentication.
    #[default]
    None,
    /// Static bearer token.
    Bearer,
    /// JWT verification.
    Jwt,
    /// Bearer first, JWT fallback.
    BearerOrJwt,
}

/// JWT signature algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC-SHA256 with a shared secret.
    #[default]
    Hs256,
    /// RSA-SHA256 with a PEM public key.
    Rs256,
}

/// JWT verification configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JwtConfig {
    /// Signature algorithm.
    #[serde(default)]
    pub algorithm: JwtAlgorithm,
    /// Environment variable holding the HS256 secret.
    #[serde(default)]
    pub secret_env: Option<String>,
    /// Environment variable holding the RS256 PEM public key.
    #[serde(default)]
    pub public_key_env: Option<String>,
    /// File holding the RS256 PEM public key.
    #[serde(default)]
    pub public_key_file: Option<String>,
    /// Expected issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Accepted audiences.
    #[serde(default)]
    pub aud: Vec<String>,
    /// Claims that must equal the configured values exactly.
    #[serde(default)]
    pub required_claims: BTreeMap<String, Value>,
    /// Allowed clock skew for `exp`/`nbf` in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: u64,
}

/// Returns the default JWT clock skew.
const fn default_clock_skew() -> u64 {
    30
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Authentication mode.
    #[serde(default)]
    pub mode: AuthMode,
    /// Environment variable holding the bearer secret.
    #[serde(default)]
    pub bearer_token_env: Option<String>,
    /// JWT verification settings.
    #[serde(default)]
    pub jwt: JwtConfig,
}

/// Rate-limit key discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKey {
    /// Remote IP.
    #[default]
    Ip,
    /// Authenticated subject.
    Subject,
    /// Remote IP and subject combined.
    IpSubject,
}

/// Fixed-window rate-limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Key discriminator.
    #[serde(default)]
    pub key: RateLimitKey,
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length in seconds.
    pub window_seconds: u64,
}

/// Break-glass header configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakGlassConfig {
    /// Header name carrying the override secret.
    #[serde(default = "default_break_glass_header")]
    pub header: String,
    /// Environment variable holding the override secret.
    pub secret_env: String,
}

/// Returns the default break-glass header name.
fn default_break_glass_header() -> String {
    "x-datatrust-break-glass".to_string()
}

/// HTTP transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tool RPC path.
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,
    /// Request body cap in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// TLS settings.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Rate-limit settings.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Break-glass settings.
    #[serde(default)]
    pub break_glass: Option<BreakGlassConfig>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mcp_path: default_mcp_path(),
            max_body_bytes: default_max_body_bytes(),
            tls: None,
            auth: AuthConfig::default(),
            rate_limit: None,
            break_glass: None,
        }
    }
}

/// Returns the default bind host.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Returns the default bind port.
const fn default_port() -> u16 {
    8181
}

/// Returns the default tool RPC path.
fn default_mcp_path() -> String {
    "/mcp".to_string()
}

/// Returns the default request body cap (5 MB).
const fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024
}

/// Audit sink configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Base directory for the operation audit trail.
    #[serde(default = "default_operation_dir")]
    pub operation_dir: String,
    /// Directory for the hash-chained policy audit.
    #[serde(default = "default_policy_dir")]
    pub policy_dir: String,
    /// Retention window in calendar days for operation audit files.
    #[serde(default)]
    pub retention_days: Option<u32>,
    /// Policy audit rotation threshold in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Remote mirror endpoint for policy decisions.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            operation_dir: default_operation_dir(),
            policy_dir: default_policy_dir(),
            retention_days: None,
            max_file_bytes: default_max_file_bytes(),
            remote_url: None,
        }
    }
}

/// Returns the default operation audit directory.
fn default_operation_dir() -> String {
    "./data/audit".to_string()
}

/// Returns the default policy audit directory.
fn default_policy_dir() -> String {
    "./data/policy-audit".to_string()
}

/// Returns the default policy audit rotation threshold (10 MB).
const fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

/// Runtime defaults for dispatch and governance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Global tool concurrency.
    #[serde(default = "default_tool_concurrency")]
    pub tool_concurrency: usize,
    /// Tool timeout in milliseconds.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    /// Per-connector concurrency.
    #[serde(default = "default_connector_concurrency")]
    pub connector_concurrency: usize,
    /// Per-operation connector timeout in milliseconds.
    #[serde(default = "default_connector_timeout_ms")]
    pub connector_timeout_ms: u64,
    /// Retry attempts for idempotent connector operations.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Breaker failure threshold.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,
    /// Breaker open window in milliseconds.
    #[serde(default = "default_breaker_open_ms")]
    pub breaker_open_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tool_concurrency: default_tool_concurrency(),
            tool_timeout_ms: default_tool_timeout_ms(),
            connector_concurrency: default_connector_concurrency(),
            connector_timeout_ms: default_connector_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_open_ms: default_breaker_open_ms(),
        }
    }
}

/// Returns the default global tool concurrency.
const fn default_tool_concurrency() -> usize {
    25
}

/// Returns the default tool timeout.
const fn default_tool_timeout_ms() -> u64 {
    120_000
}

/// Returns the default per-connector concurrency.
const fn default_connector_concurrency() -> usize {
    10
}

/// Returns the default connector operation timeout.
const fn default_connector_timeout_ms() -> u64 {
    60_000
}

/// Returns the default retry attempt count.
const fn default_retry_attempts() -> u32 {
    3
}

/// Returns the default breaker failure threshold.
const fn default_breaker_threshold() -> u32 {
    5
}

/// Returns the default breaker open window.
const fn default_breaker_open_ms() -> u64 {
    30_000
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and above.
    Warn,
    /// Errors only.
    Error,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level emitted.
    #[serde(default)]
    pub level: LogLevel,
}

/// Server section of the root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport selection.
    #[serde(default)]
    pub transport: TransportKind,
    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Base policy document.
    #[serde(default)]
    pub policy: Policy,
    /// Tenant overlays keyed by tenant id.
    #[serde(default)]
    pub tenants: BTreeMap<String, PolicyOverlay>,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Snapshot directory.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    /// Runtime defaults.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Returns the default snapshot directory.
fn default_snapshot_dir() -> String {
    "./data/snapshots".to_string()
}

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Connector entries.
    #[serde(default)]
    pub connectors: Vec<ConnectorEntry>,
    /// Server section.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Validates cross-field rules deserialization cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.connectors {
            let common = entry.common();
            if common.id.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "a `{}` connector entry has an empty id",
                    entry.type_tag()
                )));
            }
            if !seen.insert(common.id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate connector id `{}`",
                    common.id
                )));
            }
            self.validate_entry(entry)?;
        }

        let http = &self.server.http;
        if !http.mcp_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "http.mcp_path `{}` must start with `/`",
                http.mcp_path
            )));
        }
        if http.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "http.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(rate_limit) = &http.rate_limit
            && (rate_limit.limit == 0 || rate_limit.window_seconds == 0)
        {
            return Err(ConfigError::Invalid(
                "rate_limit.limit and rate_limit.window_seconds must be greater than zero"
                    .to_string(),
            ));
        }
        match http.auth.mode {
            AuthMode::Bearer | AuthMode::BearerOrJwt
                if http.auth.bearer_token_env.is_none() =>
            {
                return Err(ConfigError::Invalid(
                    "auth.bearer_token_env is required for bearer authentication".to_string(),
                ));
            }
            _ => {}
        }
        if matches!(http.auth.mode, AuthMode::Jwt | AuthMode::BearerOrJwt) {
            let jwt = &http.auth.jwt;
            match jwt.algorithm {
                JwtAlgorithm::Hs256 if jwt.secret_env.is_none() => {
                    return Err(ConfigError::Invalid(
                        "auth.jwt.secret_env is required for HS256".to_string(),
                    ));
                }
                JwtAlgorithm::Rs256
                    if jwt.public_key_env.is_none() && jwt.public_key_file.is_none() =>
                {
                    return Err(ConfigError::Invalid(
                        "auth.jwt.public_key_env or public_key_file is required for RS256"
                            .to_string(),
                    ));
                }
                _ => {}
            }
        }
        if self.server.runtime.tool_concurrency == 0
            || self.server.runtime.connector_concurrency == 0
        {
            return Err(ConfigError::Invalid(
                "runtime concurrency values must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates one connector entry's per-type rules.
    fn validate_entry(&self, entry: &ConnectorEntry) -> Result<(), ConfigError> {
        let id = &entry.common().id;
        match entry {
            ConnectorEntry::Csv {
                path,
                delimiter,
                ..
            } => {
                if path.is_empty() {
                    return Err(ConfigError::Invalid(format!("connector `{id}`: empty path")));
                }
                if delimiter.len() != 1 || !delimiter.is_ascii() {
                    return Err(ConfigError::Invalid(format!(
                        "connector `{id}`: delimiter must be one ascii character"
                    )));
                }
            }
            ConnectorEntry::Json {
                path, ..
            }
            | ConnectorEntry::Excel {
                path, ..
            } => {
                if path.is_empty() {
                    return Err(ConfigError::Invalid(format!("connector `{id}`: empty path")));
                }
            }
            ConnectorEntry::Odoo {
                url,
                database,
                model,
                ..
            } => {
                if url.is_empty() || database.is_empty() || model.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "connector `{id}`: url, database, and model are required"
                    )));
                }
            }
            ConnectorEntry::Hubspot {
                access_token,
                object_type,
                ..
            } => {
                if access_token.is_empty() || object_type.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "connector `{id}`: access_token and object_type are required"
                    )));
                }
            }
            ConnectorEntry::Postgresql {
                connection_string,
                table,
                ..
            }
            | ConnectorEntry::Mysql {
                connection_string,
                table,
                ..
            } => {
                if connection_string.is_empty() || table.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "connector `{id}`: connection_string and table are required"
                    )));
                }
            }
            ConnectorEntry::Memory {
                ..
            } => {}
        }
        Ok(())
    }
}
