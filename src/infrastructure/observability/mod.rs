//! Observability infrastructure - Metrics

mod pool_metrics;

pub use pool_metrics::{
    record_key_issued, record_key_revoked, record_keys_generated, record_pool_available,
    record_pool_exhausted,
};
