// crates/datatrust-cli/src/main.rs
// ============================================================================
// Module: DataTrust CLI Entry Point
// Description: Command dispatcher for the DataTrust tool server.
// Purpose: Load configuration, start the selected transport, shut down cleanly.
// Dependencies: clap, datatrust-config, datatrust-server, tokio
// ============================================================================

//! ## Overview
//! `datatrust serve` loads and validates the configuration, wires the
//! runtime, and serves the configured transport until SIGINT or SIGTERM
//! initiates a graceful shutdown: stop accepting, drain in-flight calls,
//! disconnect connectors, flush sinks, exit zero. Fatal initialization
//! failures exit non-zero with a diagnostic on stderr.
//! `datatrust check-config` validates a configuration without serving.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use datatrust_config::TransportKind;
use datatrust_server::HttpState;
use datatrust_server::StderrLogSink;
use datatrust_server::build_runtime;
use datatrust_server::telemetry::LogEvent;
use datatrust_server::telemetry::LogSink;
use serde_json::json;

// ============================================================================
// SECTION: Arguments
// ============================================================================

/// DataTrust policy-gated tool server.
#[derive(Debug, Parser)]
#[command(name = "datatrust", version, about = "Policy-gated tool server for business data")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Start the tool server.
    Serve {
        /// Path to the configuration file.
        #[arg(long, default_value = "datatrust.toml")]
        config: PathBuf,
    },
    /// Validate a configuration file and exit.
    CheckConfig {
        /// Path to the configuration file.
        #[arg(long, default_value = "datatrust.toml")]
        config: PathBuf,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
        } => serve(&config).await,
        Command::CheckConfig {
            config,
        } => check_config(&config),
    }
}

/// Validates a configuration file.
fn check_config(path: &PathBuf) -> ExitCode {
    match datatrust_config::load_config(path) {
        Ok(config) => {
            #[allow(clippy::print_stdout, reason = "Check output is the command result.")]
            {
                println!(
                    "configuration is valid: {} connector(s), transport {:?}",
                    config.connectors.len(),
                    config.server.transport,
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => fatal(&err.to_string()),
    }
}

/// Runs the server until shutdown.
async fn serve(path: &PathBuf) -> ExitCode {
    let config = match datatrust_config::load_config(path) {
        Ok(config) => config,
        Err(err) => return fatal(&err.to_string()),
    };
    let log: Arc<dyn LogSink> = Arc::new(StderrLogSink::new(config.server.logging.level));

    let runtime = match build_runtime(&config, Arc::clone(&log)).await {
        Ok(runtime) => runtime,
        Err(err) => return fatal(&err.to_string()),
    };
    log.log(LogEvent::new(
        datatrust_config::LogLevel::Info,
        "startup",
        "server runtime initialized",
        json!({
            "transport": format!("{:?}", config.server.transport),
            "connectors": runtime.registry.ids(),
            "policy_version": runtime.dispatcher.policy_version(),
        }),
    ));

    let outcome = match config.server.transport {
        TransportKind::Stdio => {
            let result = datatrust_server::stdio::run(&runtime, shutdown_signal())
                .await
                .map_err(|err| err.to_string());
            let failures = runtime.registry.disconnect_all().await;
            for failure in failures {
                log.log(LogEvent::new(
                    datatrust_config::LogLevel::Warn,
                    "shutdown",
                    "connector failed to disconnect",
                    json!({"error": failure.to_string()}),
                ));
            }
            result
        }
        TransportKind::Http => {
            let registry = Arc::clone(&runtime.registry);
            let state = Arc::new(HttpState {
                runtime,
                http: config.server.http.clone(),
            });
            let result = datatrust_server::serve(Arc::clone(&state), shutdown_signal())
                .await
                .map_err(|err| err.to_string());
            // The state keeps the registry alive through shutdown below.
            drop(state);
            let failures = registry.disconnect_all().await;
            for failure in failures {
                log.log(LogEvent::new(
                    datatrust_config::LogLevel::Warn,
                    "shutdown",
                    "connector failed to disconnect",
                    json!({"error": failure.to_string()}),
                ));
            }
            result
        }
    };

    match outcome {
        Ok(()) => {
            log.log(LogEvent::new(
                datatrust_config::LogLevel::Info,
                "shutdown",
                "server stopped",
                json!({}),
            ));
            ExitCode::SUCCESS
        }
        Err(message) => fatal(&message),
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Prints a diagnostic and returns a failing exit code.
fn fatal(message: &str) -> ExitCode {
    #[allow(clippy::print_stderr, reason = "Fatal diagnostics belong on stderr.")]
    {
        eprintln!("datatrust: {message}");
    }
    ExitCode::FAILURE
}
