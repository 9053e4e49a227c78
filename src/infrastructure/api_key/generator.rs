//! API token generation
//!
//! Draws random material from the operating system, hashes it with SHA-256
//! and encodes the digest as unpadded URL-safe base64.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::domain::api_key::{ApiToken, TokenGenerator};
use crate::domain::DomainError;

/// Random bytes drawn per token (256 bits)
const ENTROPY_BYTES: usize = 32;

/// Generator for secure API tokens
#[derive(Debug, Clone)]
pub struct SecureTokenGenerator {
    /// Prefix for all generated tokens (e.g., "pk_live_")
    prefix: String,
}

impl SecureTokenGenerator {
    /// Create a generator producing bare tokens
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    /// Set a prefix prepended to every token
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a token from the given random source
    pub fn generate_with<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<ApiToken, DomainError> {
        let mut random_bytes = [0u8; ENTROPY_BYTES];
        rng.try_fill_bytes(&mut random_bytes).map_err(|e| {
            DomainError::generator_unavailable(format!("Secure random source failed: {}", e))
        })?;

        let digest = Sha256::digest(&random_bytes);
        let token = format!("{}{}", self.prefix, URL_SAFE_NO_PAD.encode(digest));

        ApiToken::new(token).map_err(|e| {
            DomainError::configuration(format!("Invalid token prefix '{}': {}", self.prefix, e))
        })
    }
}

impl Default for SecureTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self) -> Result<ApiToken, DomainError> {
        self.generate_with(&mut OsRng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Random source that is always unavailable
    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            unimplemented!("only try_fill_bytes is used")
        }

        fn next_u64(&mut self) -> u64 {
            unimplemented!("only try_fill_bytes is used")
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unimplemented!("only try_fill_bytes is used")
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("entropy pool closed")))
        }
    }

    #[test]
    fn test_generate_token() {
        let generator = SecureTokenGenerator::new();
        let token = generator.generate().unwrap();

        // SHA-256 digest base64-encoded without padding = 43 chars
        assert_eq!(token.as_str().len(), 43);
        assert!(!token.as_str().contains('='));
        assert!(!token.as_str().contains('+'));
        assert!(!token.as_str().contains('/'));
    }

    #[test]
    fn test_generate_with_prefix() {
        let generator = SecureTokenGenerator::new().with_prefix("pk_live_");
        let token = generator.generate().unwrap();

        assert!(token.as_str().starts_with("pk_live_"));
        assert_eq!(token.as_str().len(), "pk_live_".len() + 43);
    }

    #[test]
    fn test_invalid_prefix_is_configuration_error() {
        let generator = SecureTokenGenerator::new().with_prefix("pk live ");
        let result = generator.generate();

        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_unavailable_random_source_propagates() {
        let generator = SecureTokenGenerator::new();
        let result = generator.generate_with(&mut FailingRng);

        match result {
            Err(DomainError::GeneratorUnavailable { message }) => {
                assert!(message.contains("entropy pool closed"));
            }
            other => panic!("expected GeneratorUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_token_uniqueness() {
        let generator = SecureTokenGenerator::new();
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            let token = generator.generate().unwrap();
            assert!(seen.insert(token), "duplicate token generated");
        }

        assert_eq!(seen.len(), 10_000);
    }
}
