//! Domain layer - Core business logic and entities

pub mod api_key;
pub mod clock;
pub mod error;

pub use api_key::{
    validate_token, ApiToken, KeyRecord, KeyStatus, KeyStore, TokenGenerator,
    TokenValidationError,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
