//! Key pool manager
//!
//! Provides the key lifecycle: pool creation and refill, exactly-once
//! issuance, lazy expiration checks and revocation. Every operation
//! round-trips through the key store; the manager caches no record state.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::api_key::{ApiToken, KeyRecord, KeyStore, TokenGenerator};
use crate::domain::{Clock, DomainError, SystemClock};
use crate::infrastructure::observability;

use super::generator::SecureTokenGenerator;

/// Pool sizing and expiration parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pool_size: usize,
    expiration_window: Duration,
}

impl PoolSettings {
    pub const DEFAULT_POOL_SIZE: usize = 10;
    pub const DEFAULT_EXPIRATION_DAYS: i64 = 30;
    /// Upper bound on the expiration window (100 years)
    pub const MAX_EXPIRATION_DAYS: i64 = 36_500;

    /// Create validated settings
    pub fn new(pool_size: usize, expiration_window: Duration) -> Result<Self, DomainError> {
        if pool_size == 0 {
            return Err(DomainError::configuration("Pool size must be greater than zero"));
        }

        if expiration_window <= Duration::zero() {
            return Err(DomainError::configuration(
                "Expiration window must be a positive duration",
            ));
        }

        if expiration_window > Duration::days(Self::MAX_EXPIRATION_DAYS) {
            return Err(DomainError::configuration(format!(
                "Expiration window must not exceed {} days",
                Self::MAX_EXPIRATION_DAYS
            )));
        }

        Ok(Self {
            pool_size,
            expiration_window,
        })
    }

    /// Default pool target used by `ensure_pool`
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn expiration_window(&self) -> Duration {
        self.expiration_window
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: Self::DEFAULT_POOL_SIZE,
            expiration_window: Duration::days(Self::DEFAULT_EXPIRATION_DAYS),
        }
    }
}

/// Manager for the pre-generated API key pool
#[derive(Debug)]
pub struct KeyPoolManager<S: KeyStore + ?Sized = dyn KeyStore> {
    store: Arc<S>,
    generator: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    settings: PoolSettings,
    /// Serializes count-then-insert sequences of create and refill
    pool_lock: Mutex<()>,
}

impl<S: KeyStore + ?Sized> KeyPoolManager<S> {
    /// Create a manager using the secure generator and the system clock
    pub fn new(store: Arc<S>, settings: PoolSettings) -> Self {
        Self {
            store,
            generator: Arc::new(SecureTokenGenerator::new()),
            clock: Arc::new(SystemClock),
            settings,
            pool_lock: Mutex::new(()),
        }
    }

    /// Replace the token generator
    pub fn with_generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Generate `count` fresh records created at `now`.
    ///
    /// All tokens are produced before anything touches the store, so a
    /// generator failure leaves the pool unchanged.
    fn generate_records(
        &self,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyRecord>, DomainError> {
        (0..count)
            .map(|_| -> Result<KeyRecord, DomainError> {
                let token = self.generator.generate()?;
                Ok(KeyRecord::new(token, now, self.settings.expiration_window))
            })
            .collect()
    }

    /// Generate `size` new keys and add them to the pool unconditionally.
    /// Returns the number of keys inserted.
    pub async fn create_pool(&self, size: usize) -> Result<usize, DomainError> {
        let _guard = self.pool_lock.lock().await;
        let now = self.clock.now();

        info!("Creating key pool: size={}", size);

        let records = self.generate_records(size, now)?;

        for record in records {
            self.store.insert(record).await?;
        }

        observability::record_keys_generated("create", size);
        self.publish_available(now).await;

        info!("Key pool created: inserted={}", size);

        Ok(size)
    }

    /// Top the pool up to `target_size` unused, non-expired keys.
    /// Returns the number of keys inserted (zero when there is no deficit).
    pub async fn refill_pool(&self, target_size: usize) -> Result<usize, DomainError> {
        let _guard = self.pool_lock.lock().await;
        let now = self.clock.now();

        let available = self.store.count_unused(now).await?;
        let deficit = target_size.saturating_sub(available);

        if deficit == 0 {
            debug!(
                "Key pool at target: available={}, target={}",
                available, target_size
            );
            return Ok(0);
        }

        info!(
            "Refilling key pool: available={}, target={}, deficit={}",
            available, target_size, deficit
        );

        let records = self.generate_records(deficit, now)?;

        // The store re-checks the deficit atomically, so a concurrent refill
        // from another process cannot push the pool past the target
        let inserted = self.store.insert_up_to(records, target_size, now).await?;

        observability::record_keys_generated("refill", inserted);
        self.publish_available(now).await;

        info!("Key pool refilled: inserted={}", inserted);

        Ok(inserted)
    }

    /// Refill the pool up to the configured pool size
    pub async fn ensure_pool(&self) -> Result<usize, DomainError> {
        self.refill_pool(self.settings.pool_size).await
    }

    /// Hand out one unused, non-expired key and mark it used.
    ///
    /// Fails with `PoolExhausted` when nothing is available; the pool is never
    /// refilled as a side effect.
    pub async fn issue_key(&self) -> Result<ApiToken, DomainError> {
        let now = self.clock.now();

        match self.store.claim_unused(now).await? {
            Some(record) => {
                observability::record_key_issued();
                info!("API key issued: token={}", record.token().fingerprint());
                Ok(record.token().clone())
            }
            None => {
                observability::record_pool_exhausted();
                warn!("API key pool exhausted");
                Err(DomainError::pool_exhausted(
                    "No unused, unexpired API keys available; refill the pool and retry",
                ))
            }
        }
    }

    /// True iff the token exists (used or unused) and has not expired
    pub async fn validate(&self, token: &str) -> Result<bool, DomainError> {
        let Ok(token) = ApiToken::new(token) else {
            debug!("Rejecting malformed API key");
            return Ok(false);
        };

        let now = self.clock.now();
        let valid = match self.store.lookup(&token).await? {
            Some(record) => !record.is_expired_at(now),
            None => false,
        };

        debug!("API key validated: token={}, valid={}", token.fingerprint(), valid);

        Ok(valid)
    }

    /// True iff the key's expiration time has passed.
    ///
    /// An unknown (never issued or revoked) token is `NotFound`, not "not expired".
    pub async fn is_expired(&self, token: &str) -> Result<bool, DomainError> {
        let record = self.lookup(token).await?;
        Ok(record.is_expired_at(self.clock.now()))
    }

    /// Fetch the record for a token
    pub async fn lookup(&self, token: &str) -> Result<KeyRecord, DomainError> {
        let not_found = || DomainError::not_found("API key not found");

        let token = ApiToken::new(token).map_err(|_| not_found())?;

        self.store.lookup(&token).await?.ok_or_else(not_found)
    }

    /// Delete a key unconditionally.
    ///
    /// Revoking an unknown token is a no-op. Returns whether a record was removed.
    pub async fn revoke(&self, token: &str) -> Result<bool, DomainError> {
        let Ok(token) = ApiToken::new(token) else {
            observability::record_key_revoked(false);
            return Ok(false);
        };

        let existed = self.store.delete(&token).await?;
        observability::record_key_revoked(existed);

        info!(
            "API key revoked: token={}, existed={}",
            token.fingerprint(),
            existed
        );

        Ok(existed)
    }

    /// The current pool: unused, non-expired keys, oldest first
    pub async fn list_available(&self) -> Result<Vec<KeyRecord>, DomainError> {
        self.store.list_unused(self.clock.now()).await
    }

    /// Number of keys currently available for issuance
    pub async fn available(&self) -> Result<usize, DomainError> {
        self.store.count_unused(self.clock.now()).await
    }

    async fn publish_available(&self, now: DateTime<Utc>) {
        match self.store.count_unused(now).await {
            Ok(available) => observability::record_pool_available(available),
            Err(e) => warn!("Failed to read pool size for metrics: {}", e),
        }
    }
}
