// crates/datatrust-connectors/src/registry.rs
// ============================================================================
// Module: Connector Registry
// Description: In-memory map from connector id to governed connector.
// Purpose: Give tool handlers one lookup point for every data source.
// Dependencies: datatrust-core, datatrust-governance
// ============================================================================

//! ## Overview
//! The registry owns every governed connector for the process lifetime.
//! Handlers resolve connectors by id and never touch raw adapters. Shutdown
//! walks the registry and disconnects each connector, collecting failures
//! instead of aborting midway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use datatrust_core::ConnectionState;
use datatrust_core::Connector;
use datatrust_core::ConnectorError;
use datatrust_core::ConnectorErrorKind;
use datatrust_core::ConnectorInfo;
use datatrust_governance::BreakerSnapshot;
use datatrust_governance::Governed;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Listing entry combining identity and live state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConnectorListing {
    /// Connector identity.
    #[serde(flatten)]
    pub info: ConnectorInfo,
    /// Current connection state.
    pub state: ConnectionState,
}

/// In-memory map from connector id to governed connector.
#[derive(Default)]
pub struct ConnectorRegistry {
    /// Governed connectors keyed by id.
    connectors: BTreeMap<String, Arc<Governed>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a governed connector.
    ///
    /// # Errors
    ///
    /// Returns a `CONFIGURATION_ERROR` when the id is already registered.
    pub fn insert(&mut self, connector: Arc<Governed>) -> Result<(), ConnectorError> {
        let id = connector.info().id;
        if self.connectors.contains_key(&id) {
            return Err(ConnectorError::new(
                ConnectorErrorKind::ConfigurationError,
                format!("duplicate connector id `{id}`"),
            )
            .with_suggestion("give every connector entry a unique id"));
        }
        self.connectors.insert(id, connector);
        Ok(())
    }

    /// Resolves a connector by id.
    ///
    /// # Errors
    ///
    /// Returns a `NOT_FOUND` error naming the unknown id.
    pub fn get(&self, id: &str) -> Result<Arc<Governed>, ConnectorError> {
        self.connectors.get(id).cloned().ok_or_else(|| {
            ConnectorError::new(
                ConnectorErrorKind::NotFound,
                format!("unknown connector `{id}`"),
            )
            .with_suggestion("list_connectors shows the registered ids")
        })
    }

    /// Returns identity and state for every connector.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectorListing> {
        self.connectors
            .values()
            .map(|connector| ConnectorListing {
                info: connector.info(),
                state: connector.state(),
            })
            .collect()
    }

    /// Returns breaker snapshots keyed by connector id.
    #[must_use]
    pub fn breaker_snapshots(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.connectors
            .iter()
            .map(|(id, connector)| (id.clone(), connector.breaker_snapshot()))
            .collect()
    }

    /// Returns the registered connector ids.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.connectors.keys().cloned().collect()
    }

    /// Disconnects every connector, collecting failures.
    pub async fn disconnect_all(&self) -> Vec<ConnectorError> {
        let mut failures = Vec::new();
        for connector in self.connectors.values() {
            if let Err(err) = connector.disconnect().await {
                failures.push(err);
            }
        }
        failures
    }
}
