//! API Key domain
//!
//! This module provides domain types and traits for the pre-generated key
//! pool: key records, the token generator contract and the key store.

mod entity;
mod generator;
mod repository;
mod validation;

pub use entity::{ApiToken, KeyRecord, KeyStatus};
pub use generator::TokenGenerator;
pub use repository::KeyStore;
pub use validation::{validate_token, TokenValidationError, MAX_TOKEN_LENGTH};

#[cfg(test)]
pub use repository::mock;
