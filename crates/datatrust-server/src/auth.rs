// crates/datatrust-server/src/auth.rs
// ============================================================================
// Module: Transport Authentication
// Description: Bearer and JWT authentication for the HTTP transport.
// Purpose: Resolve caller identity or reject before dispatch.
// Dependencies: jsonwebtoken, subtle, datatrust-config, datatrust-core
// ============================================================================

//! ## Overview
//! Bearer tokens compare constant-time against a process-wide secret
//! resolved from the environment at startup. JWTs verify HS256 (shared
//! secret) or RS256 (PEM public key from env or file) with `exp`/`nbf`
//! checks under a configured clock skew, optional issuer/audience checks,
//! and exact-equality required claims. Identity extraction reads the
//! subject, tenant, roles (array or space-delimited), and scopes.
//! Security posture: authorization headers are untrusted input; every
//! failure maps to 401 without leaking verification detail.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_config::AuthConfig;
use datatrust_config::AuthMode;
use datatrust_config::JwtAlgorithm;
use datatrust_config::JwtConfig;
use datatrust_core::Identity;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use serde_json::Value;
use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication initialization failure (startup time).
#[derive(Debug, thiserror::Error)]
#[error("authentication setup failed: {0}")]
pub struct AuthInitError(pub String);

/// Authentication rejection (request time, maps to 401).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unauthorized: {reason}")]
pub struct AuthError {
    /// Rejection reason for logs; not leaked verbatim to clients.
    pub reason: String,
}

impl AuthError {
    /// Creates a rejection with a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// SECTION: Authenticator
// ============================================================================

/// JWT verification material resolved at startup.
struct JwtVerifier {
    /// Decoding key.
    key: DecodingKey,
    /// Prepared validation rules.
    validation: Validation,
    /// Claims that must equal the configured values exactly.
    required_claims: std::collections::BTreeMap<String, Value>,
}

/// Request authenticator for the HTTP transport.
pub struct Authenticator {
    /// Configured mode.
    mode: AuthMode,
    /// Bearer secret resolved from the environment.
    bearer_secret: Option<String>,
    /// JWT verifier when JWT modes are enabled.
    jwt: Option<JwtVerifier>,
}

impl Authenticator {
    /// Builds an authenticator, resolving secrets from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthInitError`] when a required secret or key is missing
    /// or malformed.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthInitError> {
        let bearer_secret = match (&config.mode, &config.bearer_token_env) {
            (AuthMode::Bearer | AuthMode::BearerOrJwt, Some(env_name)) => {
                Some(std::env::var(env_name).map_err(|_| {
                    AuthInitError(format!("environment variable `{env_name}` is not set"))
                })?)
            }
            _ => None,
        };
        let jwt = match config.mode {
            AuthMode::Jwt | AuthMode::BearerOrJwt => Some(build_verifier(&config.jwt)?),
            AuthMode::None | AuthMode::Bearer => None,
        };
        Ok(Self {
            mode: config.mode,
            bearer_secret,
            jwt,
        })
    }

    /// Returns a stable label for the configured mode.
    #[must_use]
    pub const fn mode_label(&self) -> &'static str {
        match self.mode {
            AuthMode::None => "none",
            AuthMode::Bearer => "bearer",
            AuthMode::Jwt => "jwt",
            AuthMode::BearerOrJwt => "bearer_or_jwt",
        }
    }

    /// Authenticates one request from its Authorization header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the caller cannot be authenticated.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        match self.mode {
            AuthMode::None => Ok(Identity::default()),
            AuthMode::Bearer => self.check_bearer(authorization).map(|()| Identity::default()),
            AuthMode::Jwt => self.check_jwt(authorization),
            AuthMode::BearerOrJwt => {
                if self.check_bearer(authorization).is_ok() {
                    return Ok(Identity::default());
                }
                self.check_jwt(authorization)
            }
        }
    }

    /// Validates a bearer token constant-time.
    fn check_bearer(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        let token = extract_bearer(authorization)?;
        let Some(secret) = &self.bearer_secret else {
            return Err(AuthError::new("bearer secret is not configured"));
        };
        if token.len() == secret.len()
            && bool::from(token.as_bytes().ct_eq(secret.as_bytes()))
        {
            Ok(())
        } else {
            Err(AuthError::new("bearer token mismatch"))
        }
    }

    /// Verifies a JWT and extracts the identity.
    fn check_jwt(&self, authorization: Option<&str>) -> Result<Identity, AuthError> {
        let token = extract_bearer(authorization)?;
        let Some(verifier) = &self.jwt else {
            return Err(AuthError::new("jwt verification is not configured"));
        };
        let data = jsonwebtoken::decode::<Value>(token, &verifier.key, &verifier.validation)
            .map_err(|err| AuthError::new(format!("jwt rejected: {err}")))?;
        let claims = data.claims;
        for (name, expected) in &verifier.required_claims {
            if claims.get(name) != Some(expected) {
                return Err(AuthError::new(format!("required claim `{name}` mismatch")));
            }
        }
        Ok(extract_identity(&claims))
    }
}

/// Strips the `Bearer ` scheme from an Authorization header.
fn extract_bearer(authorization: Option<&str>) -> Result<&str, AuthError> {
    let header = authorization.ok_or_else(|| AuthError::new("missing authorization header"))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::new("authorization header is not a bearer token"))
}

/// Builds the JWT verifier from configuration.
fn build_verifier(config: &JwtConfig) -> Result<JwtVerifier, AuthInitError> {
    let (key, algorithm) = match config.algorithm {
        JwtAlgorithm::Hs256 => {
            let env_name = config.secret_env.as_deref().ok_or_else(|| {
                AuthInitError("jwt.secret_env is required for HS256".to_string())
            })?;
            let secret = std::env::var(env_name).map_err(|_| {
                AuthInitError(format!("environment variable `{env_name}` is not set"))
            })?;
            (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
        }
        JwtAlgorithm::Rs256 => {
            let pem = if let Some(env_name) = config.public_key_env.as_deref() {
                std::env::var(env_name).map_err(|_| {
                    AuthInitError(format!("environment variable `{env_name}` is not set"))
                })?
            } else if let Some(path) = config.public_key_file.as_deref() {
                std::fs::read_to_string(path).map_err(|err| {
                    AuthInitError(format!("failed to read public key `{path}`: {err}"))
                })?
            } else {
                return Err(AuthInitError(
                    "jwt.public_key_env or public_key_file is required for RS256".to_string(),
                ));
            };
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|err| AuthInitError(format!("invalid RS256 public key: {err}")))?;
            (key, Algorithm::RS256)
        }
    };

    let mut validation = Validation::new(algorithm);
    validation.leeway = config.clock_skew_seconds;
    validation.validate_nbf = true;
    if let Some(iss) = &config.iss {
        validation.set_issuer(&[iss]);
    }
    if config.aud.is_empty() {
        validation.validate_aud = false;
    } else {
        validation.set_audience(&config.aud);
    }

    Ok(JwtVerifier {
        key,
        validation,
        required_claims: config.required_claims.clone(),
    })
}

/// Extracts subject, tenant, roles, and scopes from verified claims.
fn extract_identity(claims: &Value) -> Identity {
    let subject = claims.get("sub").and_then(Value::as_str).map(str::to_string);
    let tenant = claims.get("tenant").and_then(Value::as_str).map(str::to_string);
    let roles = string_list(claims.get("roles"));
    let scopes = if let Some(scope) = claims.get("scope").and_then(Value::as_str) {
        scope.split_whitespace().map(str::to_string).collect()
    } else {
        string_list(claims.get("scopes"))
    };
    Identity {
        subject,
        tenant,
        roles,
        scopes,
    }
}

/// Reads a claim as a string array or space-delimited string.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(text)) => text.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
