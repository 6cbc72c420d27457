// crates/datatrust-connectors/src/file/mod.rs
// ============================================================================
// Module: File Connector Core
// Description: Shared whole-file connector over pluggable parse/serialize formats.
// Purpose: Compose file-format adapters with one read/write/infer pipeline.
// Dependencies: async-trait, datatrust-core, crate::{infer, paging, writeops}
// ============================================================================

//! ## Overview
//! File-backed connectors share one core: load the whole file, parse it into
//! records with a [`FileFormat`], run the in-process read pipeline, and on
//! writes rewrite the whole file atomically (temp file + rename, mode 0600).
//! The inferred schema is cached and invalidated after every write. Format
//! adapters stay small: they only parse and serialize bytes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod csv;
pub mod json;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use datatrust_core::ConnectionState;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::ConnectorInfo;
use datatrust_core::FilterOptions;
use datatrust_core::ReadResult;
use datatrust_core::Record;
use datatrust_core::RecordValidation;
use datatrust_core::Schema;
use datatrust_core::ValidationReport;
use datatrust_core::WriteMode;
use datatrust_core::WriteResult;

use crate::infer::infer_schema;
use crate::paging::page_records;
use crate::validate::validate_against_schema;
use crate::writeops::apply_writes;

// ============================================================================
// SECTION: Format Contract
// ============================================================================

/// Parse/serialize adapter for one file format.
pub trait FileFormat: Send + Sync {
    /// Returns the connector type tag (`csv`, `json`).
    fn type_tag(&self) -> &'static str;

    /// Parses file bytes into records.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the bytes are not valid for the
    /// format or contain forbidden field names.
    fn parse(&self, bytes: &[u8]) -> Result<Vec<Record>, ConnectorError>;

    /// Serializes records into file bytes.
    ///
    /// `previous` carries the current file contents so formats embedding
    /// records inside a larger document can preserve its structure.
    ///
    /// # Errors
    /// Returns [`ConnectorError`] when the records cannot be rendered.
    fn serialize(
        &self,
        previous: Option<&[u8]>,
        records: &[Record],
    ) -> Result<Vec<u8>, ConnectorError>;
}

// ============================================================================
// SECTION: File Store
// ============================================================================

/// Atomic whole-file storage helper.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Backing file path.
    path: PathBuf,
}

impl FileStore {
    /// Creates a store for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the backing path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the full file; a missing file reads as `None`.
    ///
    /// # Errors
    /// Returns a `READ_FAILED` error for I/O failures other than not-found.
    pub fn read(&self) -> Result<Option<Vec<u8>>, ConnectorError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ConnectorError::new(
                ConnectorErrorKind::ReadFailed,
                format!("failed to read `{}`: {err}", self.path.display()),
            )
            .with_suggestion("check the file path and process permissions")),
        }
    }

    /// Atomically replaces the file contents (temp file + rename, mode 0600).
    ///
    /// # Errors
    /// Returns a `WRITE_FAILED` error on any I/O failure.
    pub fn write(&self, bytes: &[u8]) -> Result<(), ConnectorError> {
        let failure = |err: std::io::Error| {
            ConnectorError::new(
                ConnectorErrorKind::WriteFailed,
                format!("failed to write `{}`: {err}", self.path.display()),
            )
            .with_suggestion("check directory permissions and free disk space")
        };
        let directory = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile_in(directory).map_err(failure)?;
        temp.1.write_all(bytes).map_err(failure)?;
        temp.1.flush().map_err(failure)?;
        drop(temp.1);
        restrict_permissions(&temp.0).map_err(failure)?;
        fs::rename(&temp.0, &self.path).map_err(failure)?;
        Ok(())
    }
}

/// Creates a uniquely named temp file beside the target.
fn tempfile_in(directory: &Path) -> Result<(PathBuf, fs::File), std::io::Error> {
    for attempt in 0..64_u32 {
        let candidate = directory.join(format!(
            ".datatrust-{}-{attempt}.tmp",
            std::process::id()
        ));
        match fs::OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        "exhausted temp file candidates",
    ))
}

/// Restricts a file to owner read/write on Unix.
fn restrict_permissions(path: &Path) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

// ============================================================================
// SECTION: File Connector
// ============================================================================

/// File connector options shared across formats.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Connector identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether writes are rejected.
    pub readonly: bool,
    /// Key field for update/upsert matching.
    pub key_field: Option<String>,
}

/// Whole-file connector composed from a [`FileStore`] and a [`FileFormat`].
pub struct FileConnector {
    /// Options captured at construction.
    options: FileOptions,
    /// Backing store.
    store: FileStore,
    /// Format adapter.
    format: Box<dyn FileFormat>,
    /// Cached inferred schema; invalidated after writes.
    schema_cache: Mutex<Option<Schema>>,
    /// Connection state.
    state: Mutex<ConnectionState>,
}

impl FileConnector {
    /// Creates a file connector.
    #[must_use]
    pub fn new(options: FileOptions, store: FileStore, format: Box<dyn FileFormat>) -> Self {
        Self {
            options,
            store,
            format,
            schema_cache: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Loads and parses the full record set.
    fn load(&self) -> Result<Vec<Record>, ConnectorError> {
        match self.store.read()? {
            None => Ok(Vec::new()),
            Some(bytes) => self
                .format
                .parse(&bytes)
                .map_err(|err| err.with_connector(self.options.id.clone())),
        }
    }

    /// Fails when the connector is not connected.
    fn require_connected(&self) -> Result<(), ConnectorError> {
        let state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ConnectorError::new(
                ConnectorErrorKind::ConnectionFailed,
                format!("connector `{}` is not connected", self.options.id),
            )
            .with_connector(self.options.id.clone())
            .with_suggestion("call connect before issuing operations"))
        }
    }

    /// Clears the inferred schema cache.
    fn invalidate_schema(&self) {
        *self.schema_cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn info(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: self.options.id.clone(),
            name: self.options.name.clone(),
            connector_type: self.format.type_tag().to_string(),
            readonly: self.options.readonly,
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        // An existing file must parse; a missing file is an empty source.
        match self.load() {
            Ok(_) => {
                *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
                    ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
                    ConnectionState::Error;
                Err(err)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            ConnectionState::Disconnected;
        Ok(())
    }

    async fn get_schema(&self, force_refresh: bool) -> Result<Schema, ConnectorError> {
        self.require_connected()?;
        if !force_refresh {
            let cache = self.schema_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(schema) = cache.as_ref() {
                return Ok(schema.clone());
            }
        }
        let records = self.load()?;
        let schema = infer_schema(&self.options.name, &records);
        *self.schema_cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(schema.clone());
        Ok(schema)
    }

    async fn read_records(&self, filter: &FilterOptions) -> Result<ReadResult, ConnectorError> {
        self.require_connected()?;
        let records = self.load()?;
        page_records(records, filter).map_err(|err| err.with_connector(self.options.id.clone()))
    }

    async fn write_records(
        &self,
        records: &[Record],
        mode: WriteMode,
    ) -> Result<WriteResult, ConnectorError> {
        self.require_connected()?;
        if self.options.readonly {
            return Err(ConnectorError::new(
                ConnectorErrorKind::UnsupportedOperation,
                format!("connector `{}` is read-only", self.options.id),
            )
            .with_connector(self.options.id.clone())
            .with_suggestion("target a writable connector or clear the readonly flag"));
        }
        let previous = self.store.read()?;
        let mut current = match &previous {
            None => Vec::new(),
            Some(bytes) => self.format.parse(bytes)?,
        };
        let result = apply_writes(&mut current, records, mode, self.options.key_field.as_deref());
        let bytes = self.format.serialize(previous.as_deref(), &current)?;
        self.store.write(&bytes).map_err(|err| err.with_connector(self.options.id.clone()))?;
        self.invalidate_schema();
        Ok(result)
    }

    async fn validate_records(
        &self,
        records: &[Record],
    ) -> Result<ValidationReport, ConnectorError> {
        self.require_connected()?;
        let schema = {
            let existing = self.load()?;
            infer_schema(&self.options.name, &existing)
        };
        let validations: Vec<RecordValidation> = records
            .iter()
            .enumerate()
            .map(|(index, record)| validate_against_schema(index, record, &schema, false))
            .collect();
        Ok(ValidationReport::from_records(validations))
    }

    async fn test_connection(&self) -> Result<(), ConnectorError> {
        self.load().map(|_| ())
    }
}
