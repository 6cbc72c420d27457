// crates/datatrust-trust/src/audit.rs
// ============================================================================
// Module: Operation Audit Trail
// Description: Append-only NDJSON trail of connector write operations.
// Purpose: Record every create/update/delete with before/after images.
// Dependencies: datatrust-core, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! Each connector gets one NDJSON file per UTC day under a sanitized
//! per-connector directory. Appends to the same path are serialized through
//! a per-path async mutex so concurrent writers never interleave partial
//! lines. Legacy JSON-array files are read transparently. Retention pruning
//! runs on append when configured. The query engine loads the relevant date
//! files, filters, sorts newest first, and computes operation counts before
//! pagination.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;

use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_core::TrustError;
use datatrust_core::TrustErrorKind;
use datatrust_core::sanitize_path_component;
use datatrust_core::time::format_date;
use datatrust_core::time::parse_date;
use datatrust_core::time::retention_cutoff;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::snapshot::ensure_private_dir;

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Audited write operation kind.
///
/// # Invariants
/// - Variants are stable for serialization and query filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Record creation.
    Create,
    /// Record update.
    Update,
    /// Record deletion.
    Delete,
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub entry_id: String,
    /// Operation timestamp.
    pub timestamp: Timestamp,
    /// Connector the operation ran against.
    pub connector_id: String,
    /// Operation kind.
    pub operation: AuditOperation,
    /// Key of the affected record.
    pub record_key: String,
    /// Acting user or subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Record image before the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Record>,
    /// Record image after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Record>,
    /// Names of changed fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Vec<String>>,
    /// Free-form metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// Filter for audit trail queries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditQuery {
    /// Connector to query.
    pub connector_id: String,
    /// Operation subset; empty means all.
    #[serde(default)]
    pub operations: Vec<AuditOperation>,
    /// Exact record key filter.
    #[serde(default)]
    pub record_key: Option<String>,
    /// Exact user filter.
    #[serde(default)]
    pub user: Option<String>,
    /// Inclusive lower timestamp bound.
    #[serde(default)]
    pub from: Option<Timestamp>,
    /// Inclusive upper timestamp bound.
    #[serde(default)]
    pub to: Option<Timestamp>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Page offset.
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Audit query result with pre-pagination counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditQueryResult {
    /// Entries after filter, sort, and pagination.
    pub entries: Vec<AuditEntry>,
    /// Create operations matching the filter.
    pub create_count: u64,
    /// Update operations matching the filter.
    pub update_count: u64,
    /// Delete operations matching the filter.
    pub delete_count: u64,
    /// Total entries matching the filter.
    pub total: u64,
}

// ============================================================================
// SECTION: Logger
// ============================================================================

/// Append-only operation audit logger.
pub struct AuditLogger {
    /// Base directory for per-connector subdirectories.
    base_dir: PathBuf,
    /// Retention window in calendar days; `None` keeps everything.
    retention_days: Option<u32>,
    /// Per-path append locks.
    locks: StdMutex<BTreeMap<PathBuf, Arc<Mutex<()>>>>,
    /// Monotonic suffix for entry identifiers.
    sequence: std::sync::atomic::AtomicU64,
}

impl AuditLogger {
    /// Creates a logger rooted at the given directory.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, retention_days: Option<u32>) -> Self {
        Self {
            base_dir: base_dir.into(),
            retention_days,
            locks: StdMutex::new(BTreeMap::new()),
            sequence: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Issues a unique entry identifier.
    #[must_use]
    pub fn next_entry_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("op-{}-{seq:08x}", Timestamp::now().as_millis())
    }

    /// Returns the directory for a connector.
    fn connector_dir(&self, connector_id: &str) -> PathBuf {
        self.base_dir.join(sanitize_path_component(connector_id))
    }

    /// Returns the daily file path for an entry timestamp.
    fn file_for(&self, connector_id: &str, timestamp: Timestamp) -> Result<PathBuf, TrustError> {
        let date = timestamp.utc_date().ok_or_else(|| {
            TrustError::new(
                TrustErrorKind::AuditLogError,
                format!("entry timestamp {} is outside the calendar range", timestamp.as_millis()),
            )
        })?;
        Ok(self.connector_dir(connector_id).join(format!("{}.ndjson", format_date(date))))
    }

    /// Returns the append lock for a path.
    fn lock_for(&self, path: &PathBuf) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.clone()).or_default())
    }

    /// Appends one entry, serialized per path.
    ///
    /// # Errors
    ///
    /// Returns `AUDIT_LOG_ERROR` when the entry cannot be encoded or written.
    /// Callers treat this as fatal for the surrounding write operation.
    pub async fn append(&self, entry: &AuditEntry) -> Result<(), TrustError> {
        let path = self.file_for(&entry.connector_id, entry.timestamp)?;
        let directory = self.connector_dir(&entry.connector_id);
        ensure_private_dir(&directory)
            .map_err(|err| TrustError::new(TrustErrorKind::AuditLogError, err.message))?;

        let mut line = serde_json::to_vec(entry).map_err(|err| {
            TrustError::new(
                TrustErrorKind::AuditLogError,
                format!("failed to encode audit entry: {err}"),
            )
        })?;
        line.push(b'\n');

        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        append_bytes(&path, &line).map_err(|err| {
            TrustError::new(
                TrustErrorKind::AuditLogError,
                format!("failed to append audit entry to `{}`: {err}", path.display()),
            )
            .with_suggestion("check the audit directory permissions and free disk space")
        })?;
        drop(_guard);

        if let Some(days) = self.retention_days {
            self.prune(&directory, days);
        }
        Ok(())
    }

    /// Deletes daily files older than the retention window. Best effort.
    fn prune(&self, directory: &PathBuf, days: u32) {
        let Some(today) = Timestamp::now().utc_date() else {
            return;
        };
        let cutoff = retention_cutoff(today, days);
        let Ok(entries) = fs::read_dir(directory) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(date) = parse_date(stem)
                && date < cutoff
            {
                let _ = fs::remove_file(&path);
            }
        }
    }

    /// Runs a query against the stored entries.
    ///
    /// # Errors
    ///
    /// Returns `AUDIT_QUERY_ERROR` when a stored file cannot be decoded.
    pub fn query(&self, query: &AuditQuery) -> Result<AuditQueryResult, TrustError> {
        let directory = self.connector_dir(&query.connector_id);
        let entries = match fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AuditQueryResult::default());
            }
            Err(err) => {
                return Err(TrustError::new(
                    TrustErrorKind::AuditQueryError,
                    format!("failed to list audit files: {err}"),
                ));
            }
        };

        let from_date = query.from.and_then(Timestamp::utc_date);
        let to_date = query.to.and_then(Timestamp::utc_date);
        let mut matched = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Some(date) = parse_date(stem) else {
                continue;
            };
            if from_date.is_some_and(|from| date < from) || to_date.is_some_and(|to| date > to) {
                continue;
            }
            for parsed in read_entries(&path)? {
                if entry_matches(&parsed, query) {
                    matched.push(parsed);
                }
            }
        }

        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let mut result = AuditQueryResult {
            total: matched.len() as u64,
            ..AuditQueryResult::default()
        };
        for entry in &matched {
            match entry.operation {
                AuditOperation::Create => result.create_count += 1,
                AuditOperation::Update => result.update_count += 1,
                AuditOperation::Delete => result.delete_count += 1,
            }
        }

        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let start = offset.min(matched.len());
        let end = query.limit.map_or(matched.len(), |limit| {
            start
                .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
                .min(matched.len())
        });
        result.entries = matched[start..end].to_vec();
        Ok(result)
    }
}

/// Appends bytes to a file, creating it with owner-only permissions.
fn append_bytes(path: &PathBuf, bytes: &[u8]) -> Result<(), std::io::Error> {
    let existed = path.exists();
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    if !existed {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}

/// Reads entries from an NDJSON file, accepting legacy JSON-array files.
fn read_entries(path: &PathBuf) -> Result<Vec<AuditEntry>, TrustError> {
    let text = fs::read_to_string(path).map_err(|err| {
        TrustError::new(
            TrustErrorKind::AuditQueryError,
            format!("failed to read `{}`: {err}", path.display()),
        )
    })?;
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|err| {
            TrustError::new(
                TrustErrorKind::AuditQueryError,
                format!("legacy audit file `{}` is corrupt: {err}", path.display()),
            )
        });
    }
    let mut entries = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(line).map_err(|err| {
            TrustError::new(
                TrustErrorKind::AuditQueryError,
                format!("audit file `{}` holds a corrupt line: {err}", path.display()),
            )
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Applies the query filter to one entry.
fn entry_matches(entry: &AuditEntry, query: &AuditQuery) -> bool {
    if !query.operations.is_empty() && !query.operations.contains(&entry.operation) {
        return false;
    }
    if query.record_key.as_deref().is_some_and(|key| key != entry.record_key) {
        return false;
    }
    if query.user.as_deref().is_some_and(|user| entry.user.as_deref() != Some(user)) {
        return false;
    }
    if query.from.is_some_and(|from| entry.timestamp < from) {
        return false;
    }
    if query.to.is_some_and(|to| entry.timestamp > to) {
        return false;
    }
    true
}
