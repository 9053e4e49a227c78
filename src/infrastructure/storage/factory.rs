//! Key store factory for runtime backend selection

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use crate::domain::api_key::KeyStore;
use crate::domain::DomainError;
use crate::infrastructure::api_key::{InMemoryKeyStore, PostgresKeyStore};

use super::migrations::run_key_pool_migrations;

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// A concrete key store together with its backend-specific lifecycle
#[derive(Debug, Clone)]
pub enum KeyStoreBackend {
    InMemory(Arc<InMemoryKeyStore>),
    Postgres(Arc<PostgresKeyStore>),
}

impl KeyStoreBackend {
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory(_) => StorageType::InMemory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }

    /// The backend as a trait object for the pool manager
    pub fn store(&self) -> Arc<dyn KeyStore> {
        match self {
            Self::InMemory(store) => store.clone() as Arc<dyn KeyStore>,
            Self::Postgres(store) => store.clone(),
        }
    }

    /// Release backend resources
    pub async fn close(&self) {
        if let Self::Postgres(store) = self {
            store.close().await;
        }
    }
}

/// Factory for creating key store instances
#[derive(Debug)]
pub struct KeyStoreFactory;

impl KeyStoreFactory {
    /// Creates a key store based on the configuration
    pub async fn create(config: &StorageConfig) -> Result<KeyStoreBackend, DomainError> {
        let backend = match config.storage_type()? {
            StorageType::InMemory => KeyStoreBackend::InMemory(Arc::new(InMemoryKeyStore::new())),
            StorageType::Postgres => {
                let store = PostgresKeyStore::connect(&config.postgres_config()?).await?;

                if config.auto_migrate {
                    let applied = run_key_pool_migrations(store.pool()).await?;
                    info!("Key pool schema ready: applied {} migration(s)", applied);
                }

                KeyStoreBackend::Postgres(Arc::new(store))
            }
        };

        info!("Storage backend: {:?}", backend.storage_type());

        Ok(backend)
    }
}
