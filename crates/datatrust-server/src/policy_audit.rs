// crates/datatrust-server/src/policy_audit.rs
// ============================================================================
// Module: Policy Audit Sink
// Description: Hash-chained decision log with rotation and a remote mirror.
// Purpose: Persist every policy decision tamper-evidently before responding.
// Dependencies: datatrust-core, reqwest, serde_json, tokio
// ============================================================================

//! ## Overview
//! Decisions append to `<dir>/YYYY-MM-DD[-N].ndjson`, rotating when a file
//! exceeds `max_file_bytes`. Each file carries its own hash chain: the
//! first entry uses the genesis previous hash and every later entry chains
//! on its predecessor. On startup the sink recovers the last hash of the
//! newest current-day file so restarts extend the chain instead of
//! breaking it. An optional remote mirror receives each record over HTTP;
//! mirror failures are recorded in sink status and never affect decisions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::time::Duration;

use datatrust_core::DecisionCore;
use datatrust_core::DecisionRecord;
use datatrust_core::Timestamp;
use datatrust_core::hashing::GENESIS_PREV_HASH;
use datatrust_core::time::format_date;
use serde::Serialize;
use tokio::sync::Mutex;

// ============================================================================
// SECTION: Errors and Status
// ============================================================================

/// Policy audit sink failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("policy audit sink failure: {message}")]
pub struct SinkError {
    /// Failure description.
    pub message: String,
}

/// Sink status surfaced at `/admin/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkStatus {
    /// Entries written since startup.
    pub entries_written: u64,
    /// Last local write failure, when one occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Last remote mirror failure, when one occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_last_error: Option<String>,
    /// Whether a remote mirror is configured.
    pub remote_configured: bool,
}

// ============================================================================
// SECTION: Chain State
// ============================================================================

/// Mutable append state guarded by one async mutex.
struct ChainState {
    /// Calendar date of the current file.
    file_date: String,
    /// Rotation index within the day (0 = no suffix).
    rotation: u32,
    /// Bytes already in the current file.
    current_size: u64,
    /// Hash of the last record in the current file.
    last_hash: String,
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Hash-chained policy decision sink.
pub struct PolicyAuditSink {
    /// Directory holding daily files.
    dir: PathBuf,
    /// Rotation threshold in bytes.
    max_file_bytes: u64,
    /// Append state; one writer at a time.
    state: Mutex<ChainState>,
    /// Remote mirror endpoint.
    remote_url: Option<String>,
    /// HTTP client for the mirror.
    client: reqwest::Client,
    /// Status for admin reporting.
    status: StdMutex<SinkStatus>,
}

impl PolicyAuditSink {
    /// Creates a sink, recovering the chain from the newest current file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the directory cannot be created.
    pub fn new(
        dir: impl Into<PathBuf>,
        max_file_bytes: u64,
        remote_url: Option<String>,
    ) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| SinkError {
            message: format!("failed to create `{}`: {err}", dir.display()),
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700));
        }

        let today = today_string();
        let (rotation, current_size, last_hash) = recover_chain(&dir, &today);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| SinkError {
                message: format!("failed to build mirror client: {err}"),
            })?;
        Ok(Self {
            dir,
            max_file_bytes,
            state: Mutex::new(ChainState {
                file_date: today,
                rotation,
                current_size,
                last_hash,
            }),
            status: StdMutex::new(SinkStatus {
                remote_configured: remote_url.is_some(),
                ..SinkStatus::default()
            }),
            remote_url,
            client,
        })
    }

    /// Appends a decision, returning the sealed record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when encoding or the local write fails. Remote
    /// mirror failures are swallowed into sink status.
    pub async fn append(&self, core: DecisionCore) -> Result<DecisionRecord, SinkError> {
        let mut state = self.state.lock().await;

        // A new UTC day or an oversized file starts a fresh chain.
        let today = today_string();
        if state.file_date != today {
            state.file_date = today;
            state.rotation = 0;
            state.current_size = 0;
            state.last_hash = GENESIS_PREV_HASH.to_string();
        }

        let record = DecisionRecord::seal(core, &state.last_hash).map_err(|err| {
            self.note_error(format!("failed to encode decision: {err}"));
            SinkError {
                message: format!("failed to encode decision: {err}"),
            }
        })?;
        let mut line = serde_json::to_vec(&record).map_err(|err| {
            self.note_error(format!("failed to encode decision: {err}"));
            SinkError {
                message: format!("failed to encode decision: {err}"),
            }
        })?;
        line.push(b'\n');

        if state.current_size > 0 && state.current_size + line.len() as u64 > self.max_file_bytes {
            state.rotation += 1;
            state.current_size = 0;
            state.last_hash = GENESIS_PREV_HASH.to_string();
        }
        // Rotation resets the chain, so the record must be resealed.
        let record = if record.prev_hash == state.last_hash {
            record
        } else {
            let resealed =
                DecisionRecord::seal(record.core, &state.last_hash).map_err(|err| SinkError {
                    message: format!("failed to encode decision: {err}"),
                })?;
            line = serde_json::to_vec(&resealed).map_err(|err| SinkError {
                message: format!("failed to encode decision: {err}"),
            })?;
            line.push(b'\n');
            resealed
        };

        let path = self.file_path(&state.file_date, state.rotation);
        append_line(&path, &line).map_err(|err| {
            self.note_error(err.clone());
            SinkError {
                message: err,
            }
        })?;
        state.current_size += line.len() as u64;
        state.last_hash.clone_from(&record.hash);
        drop(state);

        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            status.entries_written += 1;
        }
        self.mirror(&record).await;
        Ok(record)
    }

    /// Sends a record to the remote mirror, best effort.
    async fn mirror(&self, record: &DecisionRecord) {
        let Some(url) = &self.remote_url else {
            return;
        };
        let outcome = self.client.post(url).json(record).send().await;
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(response) if response.status().is_success() => {
                status.remote_last_error = None;
            }
            Ok(response) => {
                status.remote_last_error =
                    Some(format!("mirror returned status {}", response.status()));
            }
            Err(err) => {
                status.remote_last_error = Some(format!("mirror request failed: {err}"));
            }
        }
    }

    /// Records a local write failure in status.
    fn note_error(&self, message: String) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.last_error = Some(message);
    }

    /// Returns the current sink status.
    #[must_use]
    pub fn status(&self) -> SinkStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the file path for a date and rotation index.
    fn file_path(&self, date: &str, rotation: u32) -> PathBuf {
        if rotation == 0 {
            self.dir.join(format!("{date}.ndjson"))
        } else {
            self.dir.join(format!("{date}-{rotation}.ndjson"))
        }
    }
}

/// Renders today's UTC date.
fn today_string() -> String {
    Timestamp::now().utc_date().map_or_else(|| "1970-01-01".to_string(), format_date)
}

/// Recovers (rotation, size, last hash) from the newest current-day file.
fn recover_chain(dir: &Path, today: &str) -> (u32, u64, String) {
    let mut best: Option<(u32, PathBuf)> = None;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let rotation = if stem == today {
                Some(0)
            } else {
                stem.strip_prefix(&format!("{today}-")).and_then(|suffix| suffix.parse().ok())
            };
            if let Some(rotation) = rotation
                && best.as_ref().is_none_or(|(existing, _)| rotation > *existing)
            {
                best = Some((rotation, path));
            }
        }
    }
    let Some((rotation, path)) = best else {
        return (0, 0, GENESIS_PREV_HASH.to_string());
    };
    let Ok(text) = fs::read_to_string(&path) else {
        return (rotation, 0, GENESIS_PREV_HASH.to_string());
    };
    let size = text.len() as u64;
    let last_hash = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .last()
        .and_then(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .and_then(|value| value.get("hash").and_then(|hash| hash.as_str()).map(str::to_string))
        .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());
    (rotation, size, last_hash)
}

/// Appends one line, creating the file with owner-only permissions.
fn append_line(path: &PathBuf, line: &[u8]) -> Result<(), String> {
    let existed = path.exists();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed to open `{}`: {err}", path.display()))?;
    file.write_all(line).map_err(|err| format!("failed to append `{}`: {err}", path.display()))?;
    file.flush().map_err(|err| format!("failed to flush `{}`: {err}", path.display()))?;
    if !existed {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
