//! Storage factory for creating backend instances.
//!
//! Provides a flexible way to instantiate datastore backends from
//! configuration without exposing implementation details to consumers.

use std::str::FromStr;
use std::sync::Arc;

use lattice_types::StoreError;

use crate::memory::MemoryBackend;
use crate::readonly::ReadOnlyDatastore;
use crate::{Result, TupleDatastore};

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-memory storage (for testing and development).
    Memory,
}

impl FromStr for BackendType {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(BackendType::Memory),
            _ => Err(StoreError::InvalidArgument(format!(
                "unknown backend type: {}",
                s
            ))),
        }
    }
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Memory => "memory",
        }
    }
}

/// Configuration for a storage backend instance.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendType,
    /// Wrap the backend so every mutation fails with `ServiceReadOnly`.
    pub read_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Memory,
            read_only: false,
        }
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Storage factory for creating backend instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a datastore from configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn TupleDatastore>> {
        let store: Arc<dyn TupleDatastore> = match config.backend {
            BackendType::Memory => Arc::new(MemoryBackend::new()),
        };

        if config.read_only {
            Ok(Arc::new(ReadOnlyDatastore::new(store)))
        } else {
            Ok(store)
        }
    }

    /// Create a datastore from the application configuration section.
    pub fn from_config(config: &lattice_config::StorageConfig) -> Result<Arc<dyn TupleDatastore>> {
        let backend = config.backend.parse::<BackendType>()?;
        Self::create(StorageConfig {
            backend,
            read_only: config.read_only,
        })
    }

    /// Create a default in-memory datastore.
    pub fn memory() -> Arc<dyn TupleDatastore> {
        Arc::new(MemoryBackend::new())
    }
}
