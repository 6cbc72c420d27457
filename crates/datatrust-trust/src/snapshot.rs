// crates/datatrust-trust/src/snapshot.rs
// ============================================================================
// Module: Snapshot Store
// Description: Immutable saved copies of connector record sets.
// Purpose: Anchor change detection against a known-good point in time.
// Dependencies: datatrust-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A snapshot is an immutable tuple of metadata plus records, stored as one
//! JSON file per snapshot under the snapshot directory. Identifiers are
//! sanitized before they become file names; creation requires a fresh id and
//! existing files are never mutated. A snapshot is usable only against the
//! connector whose id matches its stored `connector_id`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use datatrust_core::Record;
use datatrust_core::Timestamp;
use datatrust_core::TrustError;
use datatrust_core::TrustErrorKind;
use datatrust_core::sanitize_path_component;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// Snapshot metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// User-chosen snapshot identifier.
    pub id: String,
    /// Connector the snapshot was taken from.
    pub connector_id: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Number of records captured.
    pub record_count: u64,
}

/// Full snapshot document as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot metadata.
    pub meta: SnapshotMeta,
    /// Captured records.
    pub records: Vec<Record>,
    /// Optional free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Filesystem-backed snapshot store.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    /// Directory holding one JSON file per snapshot.
    dir: PathBuf,
}

impl SnapshotStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// Returns the file path for a snapshot id.
    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_path_component(id)))
    }

    /// Creates a snapshot; the id must be fresh.
    ///
    /// # Errors
    ///
    /// Returns `SNAPSHOT_EXISTS` for a duplicate id and `SNAPSHOT_ERROR` for
    /// I/O failures.
    pub fn create(&self, snapshot: &Snapshot) -> Result<(), TrustError> {
        ensure_private_dir(&self.dir)?;
        let path = self.path_for(&snapshot.meta.id);
        if path.exists() {
            return Err(TrustError::new(
                TrustErrorKind::SnapshotExists,
                format!("snapshot `{}` already exists", snapshot.meta.id),
            )
            .with_suggestion("choose a fresh snapshot id or delete the existing snapshot"));
        }
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|err| {
            TrustError::new(
                TrustErrorKind::SnapshotError,
                format!("failed to encode snapshot `{}`: {err}", snapshot.meta.id),
            )
        })?;
        write_private(&path, &bytes).map_err(|err| {
            TrustError::new(
                TrustErrorKind::SnapshotError,
                format!("failed to write snapshot `{}`: {err}", snapshot.meta.id),
            )
            .with_suggestion("check the snapshot directory permissions")
        })
    }

    /// Loads a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns `SNAPSHOT_NOT_FOUND` for unknown ids and `SNAPSHOT_ERROR` for
    /// unreadable files.
    pub fn load(&self, id: &str) -> Result<Snapshot, TrustError> {
        let path = self.path_for(id);
        let bytes = fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TrustError::new(
                    TrustErrorKind::SnapshotNotFound,
                    format!("snapshot `{id}` does not exist"),
                )
                .with_suggestion("list_snapshots shows the stored ids")
            } else {
                TrustError::new(
                    TrustErrorKind::SnapshotError,
                    format!("failed to read snapshot `{id}`: {err}"),
                )
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|err| {
            TrustError::new(
                TrustErrorKind::SnapshotError,
                format!("snapshot `{id}` is corrupt: {err}"),
            )
            .with_suggestion("delete the snapshot and create it again")
        })
    }

    /// Lists snapshot metadata, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SNAPSHOT_ERROR` when the directory cannot be read.
    pub fn list(&self) -> Result<Vec<SnapshotMeta>, TrustError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(TrustError::new(
                    TrustErrorKind::SnapshotError,
                    format!("failed to list snapshots: {err}"),
                ));
            }
        };
        let mut metas = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                TrustError::new(
                    TrustErrorKind::SnapshotError,
                    format!("failed to list snapshots: {err}"),
                )
            })?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            // Corrupt files are skipped from listings but still fail loads.
            if let Ok(bytes) = fs::read(&path)
                && let Ok(snapshot) = serde_json::from_slice::<Snapshot>(&bytes)
            {
                metas.push(snapshot.meta);
            }
        }
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(metas)
    }

    /// Deletes a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns `SNAPSHOT_NOT_FOUND` for unknown ids and `SNAPSHOT_ERROR` for
    /// I/O failures.
    pub fn delete(&self, id: &str) -> Result<(), TrustError> {
        let path = self.path_for(id);
        fs::remove_file(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TrustError::new(
                    TrustErrorKind::SnapshotNotFound,
                    format!("snapshot `{id}` does not exist"),
                )
            } else {
                TrustError::new(
                    TrustErrorKind::SnapshotError,
                    format!("failed to delete snapshot `{id}`: {err}"),
                )
            }
        })
    }
}

// ============================================================================
// SECTION: Filesystem Helpers
// ============================================================================

/// Creates the directory with owner-only permissions.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<(), TrustError> {
    fs::create_dir_all(dir).map_err(|err| {
        TrustError::new(
            TrustErrorKind::SnapshotError,
            format!("failed to create `{}`: {err}", dir.display()),
        )
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    }
    Ok(())
}

/// Writes bytes with owner-only permissions.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use datatrust_core::Record;
    use datatrust_core::Timestamp;
    use datatrust_core::TrustErrorKind;
    use serde_json::json;
    use tempfile::TempDir;

    use super::Snapshot;
    use super::SnapshotMeta;
    use super::SnapshotStore;

    fn snapshot(id: &str, created_at: i64) -> Snapshot {
        Snapshot {
            meta: SnapshotMeta {
                id: id.to_string(),
                connector_id: "csv-users".to_string(),
                created_at: Timestamp::from_millis(created_at),
                record_count: 1,
            },
            records: vec![Record::from_value(json!({"id": 1})).unwrap()],
            description: None,
        }
    }

    #[test]
    fn create_load_list_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.create(&snapshot("before-migration", 100)).unwrap();
        store.create(&snapshot("after-migration", 200)).unwrap();

        let loaded = store.load("before-migration").unwrap();
        assert_eq!(loaded.meta.record_count, 1);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "after-migration");

        store.delete("before-migration").unwrap();
        let err = store.load("before-migration").unwrap_err();
        assert_eq!(err.kind, TrustErrorKind::SnapshotNotFound);
    }

    #[test]
    fn duplicate_id_fails_with_snapshot_exists() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.create(&snapshot("dup", 1)).unwrap();
        let err = store.create(&snapshot("dup", 2)).unwrap_err();
        assert_eq!(err.kind, TrustErrorKind::SnapshotExists);
    }

    #[test]
    fn ids_are_sanitized_into_file_names() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.create(&snapshot("../escape attempt", 1)).unwrap();
        assert!(dir.path().join("___escape_attempt.json").exists());
    }
}
