//! Key pool metrics
//!
//! Recorded through the `metrics` facade. Without an installed recorder every
//! call is a no-op, so the pool manager records unconditionally.

use metrics::{counter, gauge};

/// Record freshly generated and stored keys
pub fn record_keys_generated(operation: &'static str, count: usize) {
    counter!("api_keys_generated_total", "operation" => operation).increment(count as u64);
}

/// Record a successful issuance
pub fn record_key_issued() {
    counter!("api_keys_issued_total").increment(1);
}

/// Record an issuance attempt against an empty pool
pub fn record_pool_exhausted() {
    counter!("api_keys_pool_exhausted_total").increment(1);
}

/// Record a revocation; `existed` is false for no-op revocations
pub fn record_key_revoked(existed: bool) {
    let outcome = if existed { "deleted" } else { "absent" };
    counter!("api_keys_revoked_total", "outcome" => outcome).increment(1);
}

/// Publish the current number of issuable keys
pub fn record_pool_available(available: usize) {
    gauge!("api_keys_pool_available").set(available as f64);
}
