// crates/datatrust-connectors/src/lib.rs
// ============================================================================
// Module: DataTrust Connectors
// Description: Built-in connectors, SQL guard layer, and the registry.
// Purpose: Adapt concrete data sources to the uniform connector contract.
// Dependencies: async-trait, base64, csv, datatrust-core, datatrust-governance
// ============================================================================

//! ## Overview
//! Built-in adapters cover in-memory, CSV, and JSON sources; SQL sources run
//! through the guard layer over a pluggable driver seam. Vendor SaaS
//! adapters plug in externally through the same [`datatrust_core::Connector`]
//! contract. The registry maps connector ids to governed connectors for the
//! dispatch layer.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod file;
pub mod infer;
pub mod memory;
pub mod paging;
pub mod registry;
pub mod sql;
pub mod validate;
pub mod writeops;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use file::FileConnector;
pub use file::FileOptions;
pub use file::FileStore;
pub use file::csv::CsvFormat;
pub use file::json::JsonFormat;
pub use infer::infer_schema;
pub use memory::MemoryConnector;
pub use memory::MemoryOptions;
pub use registry::ConnectorListing;
pub use registry::ConnectorRegistry;
pub use sql::SqlDialect;
pub use sql::connector::SqlConnector;
pub use sql::connector::SqlOptions;
pub use sql::executor::SqlExecutor;
pub use sql::executor::SqlStatement;
pub use validate::validate_against_schema;
