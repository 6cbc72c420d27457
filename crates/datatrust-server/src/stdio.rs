// crates/datatrust-server/src/stdio.rs
// ============================================================================
// Module: Stdio Transport
// Description: Newline-framed JSON-RPC binding over stdin/stdout.
// Purpose: Serve a local agent process without network exposure.
// Dependencies: tokio, serde_json, crate::dispatch
// ============================================================================

//! ## Overview
//! One JSON-RPC request per line on stdin, one response per line on stdout.
//! There is no authentication beyond the process boundary and no rate
//! limiting. Log output goes strictly to the structured stderr sink so the
//! tool channel carries nothing but frames.

// ============================================================================
// SECTION: Imports
// ============================================================================

use datatrust_core::Identity;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use crate::bootstrap::ServerRuntime;
use crate::dispatch::DispatchRequest;
use crate::tools::descriptors;

// ============================================================================
// SECTION: Transport Loop
// ============================================================================

/// Stdio transport failure.
#[derive(Debug, thiserror::Error)]
#[error("stdio transport failed: {0}")]
pub struct StdioError(pub String);

/// Runs the stdio loop until stdin closes or the shutdown future resolves.
///
/// # Errors
///
/// Returns [`StdioError`] when stdout cannot be written.
pub async fn run(
    runtime: &ServerRuntime,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), StdioError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => return Err(StdioError(format!("failed to read stdin: {err}"))),
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(runtime, &line).await;
        let mut rendered = response.to_string();
        rendered.push('\n');
        stdout
            .write_all(rendered.as_bytes())
            .await
            .map_err(|err| StdioError(format!("failed to write stdout: {err}")))?;
        stdout
            .flush()
            .await
            .map_err(|err| StdioError(format!("failed to flush stdout: {err}")))?;
    }
    Ok(())
}

/// Handles one framed request line.
async fn handle_line(runtime: &ServerRuntime, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            return json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": format!("invalid json: {err}")},
            });
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    match method {
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": descriptors()},
        }),
        "tools/call" => {
            let Some(name) =
                request.get("params").and_then(|params| params.get("name")).and_then(Value::as_str)
            else {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32602, "message": "missing tool name"},
                });
            };
            let arguments = request
                .get("params")
                .and_then(|params| params.get("arguments"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            let response = runtime
                .dispatcher
                .dispatch(DispatchRequest {
                    tool: name.to_string(),
                    arguments,
                    identity: Identity::default(),
                    break_glass: false,
                    traceparent: None,
                    remote_ip: None,
                })
                .await;
            let rendered = serde_json::to_value(&response).unwrap_or_else(|_| json!({}));
            json!({"jsonrpc": "2.0", "id": id, "result": rendered})
        }
        other => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("unsupported method `{other}`")},
        }),
    }
}
