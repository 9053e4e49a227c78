//! API Key infrastructure implementations
//!
//! This module provides the token generator, the in-memory and PostgreSQL
//! key stores, and the key pool manager built on top of them.

mod generator;
mod postgres_repository;
mod repository;
mod service;

pub use generator::SecureTokenGenerator;
pub use postgres_repository::PostgresKeyStore;
pub use repository::InMemoryKeyStore;
pub use service::{KeyPoolManager, PoolSettings};
