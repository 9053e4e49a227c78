//! Token generator trait

use std::fmt::Debug;

use super::entity::ApiToken;
use crate::domain::DomainError;

/// Source of new, unguessable API tokens.
///
/// Implementations must draw from a cryptographically secure random source
/// and fail with `GeneratorUnavailable` rather than fall back to a weaker one.
pub trait TokenGenerator: Send + Sync + Debug {
    /// Produce a fresh token
    fn generate(&self) -> Result<ApiToken, DomainError>;
}
