use chrono::Duration;
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;

use crate::domain::DomainError;
use crate::infrastructure::api_key::PoolSettings;
use crate::infrastructure::storage::{PostgresConfig, StorageType};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Default pool target
    pub size: usize,
    /// Lifetime of a key from creation
    pub expiration_window_secs: i64,
    /// Prefix prepended to generated tokens
    pub token_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `postgres`
    pub backend: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Apply pending schema migrations when connecting
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: PoolSettings::DEFAULT_POOL_SIZE,
            expiration_window_secs: PoolSettings::DEFAULT_EXPIRATION_DAYS * SECONDS_PER_DAY,
            token_prefix: String::new(),
        }
    }
}

impl PoolConfig {
    /// Validated pool settings for the manager
    pub fn settings(&self) -> Result<PoolSettings, DomainError> {
        let window = Duration::try_seconds(self.expiration_window_secs).ok_or_else(|| {
            DomainError::configuration(format!(
                "pool.expiration_window_secs is out of range: {}",
                self.expiration_window_secs
            ))
        })?;

        PoolSettings::new(self.size, window)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let postgres = PostgresConfig::default();

        Self {
            backend: "memory".to_string(),
            database_url: None,
            max_connections: postgres.max_connections,
            min_connections: postgres.min_connections,
            connect_timeout_secs: postgres.connect_timeout_secs,
            idle_timeout_secs: postgres.idle_timeout_secs,
            auto_migrate: true,
        }
    }
}

impl StorageConfig {
    pub fn storage_type(&self) -> Result<StorageType, DomainError> {
        StorageType::parse(&self.backend).ok_or_else(|| {
            DomainError::configuration(format!("Unknown storage backend '{}'", self.backend))
        })
    }

    /// Connection settings for the PostgreSQL backend
    pub fn postgres_config(&self) -> Result<PostgresConfig, DomainError> {
        let url = self.database_url.clone().ok_or_else(|| {
            DomainError::configuration("storage.database_url is required for the postgres backend")
        })?;

        Ok(PostgresConfig::new(url)
            .with_max_connections(self.max_connections)
            .with_min_connections(self.min_connections)
            .with_connect_timeout_secs(self.connect_timeout_secs)
            .with_idle_timeout_secs(self.idle_timeout_secs))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from `config/default`, `config/local` and `APP__*` environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }
}
