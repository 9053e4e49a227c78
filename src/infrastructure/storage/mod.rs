//! Storage infrastructure - backend selection, connection pooling and schema

mod factory;
pub mod migrations;
mod postgres;

pub use factory::{KeyStoreBackend, KeyStoreFactory, StorageType};
pub use postgres::PostgresConfig;
