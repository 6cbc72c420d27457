// crates/datatrust-server/src/server.rs
// ============================================================================
// Module: HTTP Transport
// Description: Axum-based HTTP(S) binding for the tool RPC surface.
// Purpose: Serve tool calls, metrics, health, and admin status over HTTP.
// Dependencies: axum, axum-server, rustls, crate::{auth, dispatch, rate_limit}
// ============================================================================

//! ## Overview
//! The router exposes the tool RPC path (JSON-RPC `tools/list` and
//! `tools/call`), `/metrics` in Prometheus text format, `/healthz`, and
//! `/admin/status`. Every tool request passes the body-size cap,
//! authentication, rate limiting, and break-glass extraction before it
//! reaches the dispatcher. TLS is optional; `request_cert` turns on mutual
//! TLS, where unauthorized sockets are rejected during the handshake.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::RETRY_AFTER;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use datatrust_config::HttpConfig;
use datatrust_config::TlsConfig;
use serde_json::Value;
use serde_json::json;
use subtle::ConstantTimeEq;

use datatrust_config::LogLevel;

use crate::bootstrap::ServerRuntime;
use crate::dispatch::DispatchRequest;
use crate::telemetry::LogEvent;
use crate::tools::descriptors;

// ============================================================================
// SECTION: JSON-RPC Shapes
// ============================================================================

/// JSON-RPC error codes used by the transport.
const PARSE_ERROR: i64 = -32700;
/// Method-not-found code.
const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid-params code.
const INVALID_PARAMS: i64 = -32602;

/// Builds a JSON-RPC result envelope.
fn rpc_result(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Builds a JSON-RPC error envelope.
fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared HTTP state.
pub struct HttpState {
    /// Wired runtime.
    pub runtime: ServerRuntime,
    /// HTTP configuration.
    pub http: HttpConfig,
}

/// Builds the router for the configured paths.
#[must_use]
pub fn build_router(state: Arc<HttpState>) -> Router {
    let mcp_path = state.http.mcp_path.clone();
    Router::new()
        .route(&mcp_path, post(handle_mcp))
        .route("/metrics", get(handle_metrics))
        .route("/healthz", get(handle_healthz))
        .route("/admin/status", get(handle_admin_status))
        .with_state(state)
}

// ============================================================================
// SECTION: Tool RPC Handler
// ============================================================================

/// Handles one tool RPC request.
async fn handle_mcp(
    State(state): State<Arc<HttpState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Declared and observed sizes are both held to the cap.
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared.is_some_and(|length| length > state.http.max_body_bytes)
        || body.len() as u64 > state.http.max_body_bytes
    {
        return (StatusCode::PAYLOAD_TOO_LARGE, "request body exceeds the configured cap")
            .into_response();
    }

    // Authentication.
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let identity = match state.runtime.authenticator.authenticate(authorization) {
        Ok(identity) => identity,
        Err(err) => {
            state.runtime.log.log(LogEvent::new(
                LogLevel::Warn,
                "auth_rejected",
                "request failed authentication",
                json!({"peer": peer.ip().to_string(), "reason": err.reason}),
            ));
            return (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Bearer")],
                "unauthorized",
            )
                .into_response();
        }
    };

    // Rate limiting.
    if let Some(limiter) = &state.runtime.rate_limiter {
        let key = limiter.key_for(&peer.ip().to_string(), identity.subject.as_deref());
        let decision = limiter.check(&key);
        if !decision.allowed {
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
            attach_rate_headers(&mut response, &decision);
            if let Ok(value) = decision.reset_seconds.to_string().parse() {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            return response;
        }
        let mut response = respond_rpc(&state, identity, peer, &headers, body).await;
        attach_rate_headers(&mut response, &decision);
        return response;
    }

    respond_rpc(&state, identity, peer, &headers, body).await
}

/// Attaches the `X-RateLimit-*` headers to a response.
fn attach_rate_headers(response: &mut Response, decision: &crate::rate_limit::RateDecision) {
    for (name, value) in [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_seconds.to_string()),
    ] {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
}

/// Runs the JSON-RPC body through the dispatcher and renders the response.
async fn respond_rpc(
    state: &Arc<HttpState>,
    identity: datatrust_core::Identity,
    peer: SocketAddr,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let break_glass = break_glass_requested(state, headers);
    let traceparent = headers
        .get("traceparent")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return json_response(
                StatusCode::OK,
                &rpc_error(Value::Null, PARSE_ERROR, &format!("invalid json: {err}")),
            );
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();

    match method {
        "tools/list" => json_response(
            StatusCode::OK,
            &rpc_result(id, json!({"tools": descriptors()})),
        ),
        "tools/call" => {
            let Some(params) = request.get("params") else {
                return json_response(
                    StatusCode::OK,
                    &rpc_error(id, INVALID_PARAMS, "missing params"),
                );
            };
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return json_response(
                    StatusCode::OK,
                    &rpc_error(id, INVALID_PARAMS, "missing tool name"),
                );
            };
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let response = state
                .runtime
                .dispatcher
                .dispatch(DispatchRequest {
                    tool: name.to_string(),
                    arguments,
                    identity,
                    break_glass,
                    traceparent,
                    remote_ip: Some(peer.ip().to_string()),
                })
                .await;
            let rendered = serde_json::to_value(&response).unwrap_or_else(|_| json!({}));
            json_response(StatusCode::OK, &rpc_result(id, rendered))
        }
        _ => json_response(
            StatusCode::OK,
            &rpc_error(id, METHOD_NOT_FOUND, &format!("unsupported method `{method}`")),
        ),
    }
}

/// Returns true when the break-glass header matches the configured secret.
fn break_glass_requested(state: &Arc<HttpState>, headers: &HeaderMap) -> bool {
    let Some((header_name, secret)) = &state.runtime.break_glass else {
        return false;
    };
    let Some(value) = headers.get(header_name.as_str()).and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    value.len() == secret.len() && bool::from(value.as_bytes().ct_eq(secret.as_bytes()))
}

/// Renders a JSON body with the given status.
fn json_response(status: StatusCode, body: &Value) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

// ============================================================================
// SECTION: Observability Handlers
// ============================================================================

/// Serves the Prometheus text exposition.
async fn handle_metrics(State(state): State<Arc<HttpState>>) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.runtime.metrics.render_prometheus(),
    )
        .into_response()
}

/// Serves the plaintext liveness probe.
async fn handle_healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

/// Serves the admin status snapshot.
async fn handle_admin_status(State(state): State<Arc<HttpState>>) -> Response {
    let runtime = &state.runtime;
    let body = json!({
        "connectors": runtime.registry.list(),
        "health": runtime.health.snapshot(),
        "breakers": runtime.registry.breaker_snapshots(),
        "policy_version": runtime.dispatcher.policy_version(),
        "policy_audit": runtime.dispatcher.policy_audit().status(),
        "auth_mode": runtime.authenticator.mode_label(),
        "break_glass_enabled": runtime.break_glass.is_some(),
        "rate_limit_enabled": runtime.rate_limiter.is_some(),
    });
    json_response(StatusCode::OK, &body)
}

// ============================================================================
// SECTION: Serving
// ============================================================================

/// Serve failure.
#[derive(Debug, thiserror::Error)]
#[error("http server failed: {0}")]
pub struct ServeError(pub String);

/// Serves the router until the shutdown future resolves.
///
/// # Errors
///
/// Returns [`ServeError`] when binding or TLS setup fails.
pub async fn serve(
    state: Arc<HttpState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError> {
    let address: SocketAddr = format!("{}:{}", state.http.host, state.http.port)
        .parse()
        .map_err(|err| ServeError(format!("invalid bind address: {err}")))?;
    let router = build_router(Arc::clone(&state));
    let app = router.into_make_service_with_connect_info::<SocketAddr>();

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
    });

    match state.http.tls.clone() {
        Some(tls) => {
            let rustls_config = build_tls(&tls).await?;
            axum_server::bind_rustls(address, rustls_config)
                .handle(handle)
                .serve(app)
                .await
                .map_err(|err| ServeError(err.to_string()))
        }
        None => axum_server::bind(address)
            .handle(handle)
            .serve(app)
            .await
            .map_err(|err| ServeError(err.to_string())),
    }
}

/// Builds the rustls configuration, including mutual TLS when requested.
async fn build_tls(tls: &TlsConfig) -> Result<axum_server::tls_rustls::RustlsConfig, ServeError> {
    if !tls.request_cert {
        return axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
            .await
            .map_err(|err| ServeError(format!("tls setup failed: {err}")));
    }

    use rustls_pki_types::CertificateDer;
    use rustls_pki_types::PrivateKeyDer;
    use rustls_pki_types::pem::PemObject;

    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_file_iter(&tls.cert_file)
        .map_err(|err| ServeError(format!("failed to read cert chain: {err}")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ServeError(format!("failed to parse cert chain: {err}")))?;
    let key = PrivateKeyDer::from_pem_file(&tls.key_file)
        .map_err(|err| ServeError(format!("failed to read private key: {err}")))?;

    let ca_file = tls.ca_file.as_deref().ok_or_else(|| {
        ServeError("tls.ca_file is required when request_cert is set".to_string())
    })?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter(ca_file)
        .map_err(|err| ServeError(format!("failed to read ca bundle: {err}")))?
    {
        let cert = cert.map_err(|err| ServeError(format!("failed to parse ca bundle: {err}")))?;
        roots
            .add(cert)
            .map_err(|err| ServeError(format!("invalid ca certificate: {err}")))?;
    }
    let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|err| ServeError(format!("client verifier setup failed: {err}")))?;
    let server_config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|err| ServeError(format!("tls setup failed: {err}")))?;
    Ok(axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(server_config)))
}
