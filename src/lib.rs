//! API Key Pool
//!
//! Issues, tracks and revokes API keys drawn from a pre-generated pool:
//! - Pool creation and refill-on-demand up to a target size
//! - Exactly-once issuance of unused keys, safe under concurrent callers
//! - Lazy expiration checks and idempotent revocation
//! - In-memory and PostgreSQL key stores

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;

use std::sync::Arc;

use infrastructure::api_key::{KeyPoolManager, SecureTokenGenerator};
use infrastructure::storage::{KeyStoreBackend, KeyStoreFactory};
use tracing::info;

/// Build the key pool manager and its store from configuration.
///
/// The returned backend must be closed on shutdown to release connections.
pub async fn create_pool_manager(
    config: &AppConfig,
) -> anyhow::Result<(KeyPoolManager, KeyStoreBackend)> {
    let settings = config.pool.settings()?;
    let backend = KeyStoreFactory::create(&config.storage).await?;

    let generator = SecureTokenGenerator::new().with_prefix(config.pool.token_prefix.clone());
    let manager =
        KeyPoolManager::new(backend.store(), settings).with_generator(Arc::new(generator));

    info!(
        "Key pool manager ready: pool_size={}, expiration_window={}s",
        settings.pool_size(),
        settings.expiration_window().num_seconds()
    );

    Ok((manager, backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_manager_from_defaults() {
        let (manager, backend) = create_pool_manager(&AppConfig::default()).await.unwrap();

        assert_eq!(manager.settings().pool_size(), 10);
        assert_eq!(manager.ensure_pool().await.unwrap(), 10);

        let token = manager.issue_key().await.unwrap();
        assert!(manager.validate(token.as_str()).await.unwrap());

        backend.close().await;
    }

    #[tokio::test]
    async fn test_create_pool_manager_applies_prefix() {
        let mut config = AppConfig::default();
        config.pool.token_prefix = "pk_test_".to_string();

        let (manager, _) = create_pool_manager(&config).await.unwrap();
        manager.create_pool(1).await.unwrap();

        let token = manager.issue_key().await.unwrap();
        assert!(token.as_str().starts_with("pk_test_"));
    }

    #[tokio::test]
    async fn test_create_pool_manager_rejects_bad_settings() {
        let mut config = AppConfig::default();
        config.pool.size = 0;

        assert!(create_pool_manager(&config).await.is_err());
    }
}
