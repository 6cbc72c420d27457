// crates/datatrust-server/src/telemetry.rs
// ============================================================================
// Module: Server Telemetry
// Description: Structured log events and tool-metric labels.
// Purpose: Provide observability hooks without hard exporter dependencies.
// Dependencies: datatrust-core, serde_json
// ============================================================================

//! ## Overview
//! Log records are structured events routed through a [`LogSink`]. The
//! default sink writes one JSON object per line to stderr so the stdio tool
//! channel stays clean; tests capture events in memory. Telemetry must
//! never carry record contents or secrets, only identifiers and labels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;
use std::sync::PoisonError;

use datatrust_core::Timestamp;
use serde_json::Value;
use serde_json::json;

use datatrust_config::LogLevel;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Tool invocation outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Successful invocation.
    Ok,
    /// Handler or transport failure.
    Error,
    /// Policy denial.
    Denied,
}

impl ToolOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Denied => "denied",
        }
    }
}

// ============================================================================
// SECTION: Log Events
// ============================================================================

/// One structured log event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Severity level.
    pub level: LogLevel,
    /// Stable event name, e.g. `tool_call`.
    pub event: String,
    /// Human-readable message.
    pub message: String,
    /// Structured fields.
    pub fields: Value,
}

impl LogEvent {
    /// Creates a log event with structured fields.
    #[must_use]
    pub fn new(
        level: LogLevel,
        event: impl Into<String>,
        message: impl Into<String>,
        fields: Value,
    ) -> Self {
        Self {
            level,
            event: event.into(),
            message: message.into(),
            fields,
        }
    }
}

/// Returns the numeric rank of a level for threshold filtering.
const fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Debug => 0,
        LogLevel::Info => 1,
        LogLevel::Warn => 2,
        LogLevel::Error => 3,
    }
}

/// Returns the stable label of a level.
const fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for structured log events.
pub trait LogSink: Send + Sync {
    /// Records one event.
    fn log(&self, event: LogEvent);
}

/// JSON-lines sink writing to stderr.
///
/// # Invariants
/// - Never writes to stdout; the stdio transport owns that channel.
pub struct StderrLogSink {
    /// Minimum level emitted.
    threshold: LogLevel,
}

impl StderrLogSink {
    /// Creates a sink with the given threshold.
    #[must_use]
    pub const fn new(threshold: LogLevel) -> Self {
        Self {
            threshold,
        }
    }
}

impl LogSink for StderrLogSink {
    fn log(&self, event: LogEvent) {
        if level_rank(event.level) < level_rank(self.threshold) {
            return;
        }
        let line = json!({
            "ts": Timestamp::now().to_rfc3339(),
            "level": level_label(event.level),
            "event": event.event,
            "message": event.message,
            "fields": event.fields,
        });
        // Logging must never take down the server; drop on I/O failure.
        #[allow(clippy::print_stderr, reason = "Stderr is the designated log channel.")]
        {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct CaptureLogSink {
    /// Captured events.
    events: Mutex<Vec<LogEvent>>,
}

impl CaptureLogSink {
    /// Creates an empty capture sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured events.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LogSink for CaptureLogSink {
    fn log(&self, event: LogEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

/// No-op sink.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn log(&self, _event: LogEvent) {}
}
