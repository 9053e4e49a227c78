//! API token format validation

use thiserror::Error;

/// Errors that can occur during API token validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenValidationError {
    #[error("API token cannot be empty")]
    Empty,

    #[error("API token exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("API token contains invalid character: '{0}'. Only URL-safe base64 characters are allowed")]
    InvalidCharacter(char),

    #[error("API token must not carry '=' padding")]
    Padded,
}

/// Matches the width of the persisted `token` column
pub const MAX_TOKEN_LENGTH: usize = 255;

/// Validate an API token string
///
/// Rules:
/// - Cannot be empty
/// - Maximum 255 characters
/// - Only URL-safe characters: ASCII alphanumerics, '-' and '_'
/// - No '=' padding
pub fn validate_token(token: &str) -> Result<(), TokenValidationError> {
    if token.is_empty() {
        return Err(TokenValidationError::Empty);
    }

    if token.len() > MAX_TOKEN_LENGTH {
        return Err(TokenValidationError::TooLong(MAX_TOKEN_LENGTH));
    }

    for c in token.chars() {
        if c == '=' {
            return Err(TokenValidationError::Padded);
        }

        if !(c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(TokenValidationError::InvalidCharacter(c));
        }
    }

    Ok(())
}
