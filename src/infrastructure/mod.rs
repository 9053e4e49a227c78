//! Infrastructure layer - Implementations of domain traits

pub mod api_key;
pub mod logging;
pub mod observability;
pub mod storage;
