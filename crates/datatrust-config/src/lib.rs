// crates/datatrust-config/src/lib.rs
// ============================================================================
// Module: DataTrust Config
// Description: Configuration loading, substitution, and validation.
// Purpose: Produce one validated configuration object for the server.
// Dependencies: datatrust-core, serde, serde_json, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is a TOML document. Loading parses the file, expands
//! `${NAME}` / `${NAME:-default}` substitutions in every string value
//! (failing fast on unset variables), deserializes into the strict model,
//! and runs cross-field validation. Callers receive either a fully
//! validated [`Config`] or a diagnostic naming the first problem.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod env_subst;
pub mod model;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use thiserror::Error;

pub use model::AuditConfig;
pub use model::AuthConfig;
pub use model::AuthMode;
pub use model::BreakGlassConfig;
pub use model::Config;
pub use model::ConnectorCommon;
pub use model::ConnectorEntry;
pub use model::HttpConfig;
pub use model::JwtAlgorithm;
pub use model::JwtConfig;
pub use model::LogLevel;
pub use model::LoggingConfig;
pub use model::RateLimitConfig;
pub use model::RateLimitKey;
pub use model::RuntimeConfig;
pub use model::ServerConfig;
pub use model::TlsConfig;
pub use model::TransportKind;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading failure.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration `{path}`: {message}")]
    Io {
        /// Offending path.
        path: String,
        /// I/O diagnostic.
        message: String,
    },
    /// The document is not valid TOML or does not match the model.
    #[error("invalid configuration: {0}")]
    Parse(String),
    /// A `${NAME}` reference names an unset environment variable.
    #[error("environment variable `{name}` is not set")]
    MissingEnvVar {
        /// Variable name.
        name: String,
    },
    /// A cross-field validation rule failed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads, substitutes, parses, and validates a configuration file.
///
/// # Errors
///
/// Returns [`ConfigError`] for unreadable files, bad TOML, unset
/// environment variables, and validation failures.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    parse_config(&text)
}

/// Parses and validates a configuration document from text.
///
/// # Errors
///
/// Returns [`ConfigError`] for bad TOML, unset environment variables, and
/// validation failures.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let mut document: toml::Value =
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
    env_subst::substitute_document(&mut document)?;
    model::check_entry_keys(&document)?;
    let config: Config =
        document.try_into().map_err(|err: toml::de::Error| ConfigError::Parse(err.to_string()))?;
    config.validate()?;
    Ok(config)
}
