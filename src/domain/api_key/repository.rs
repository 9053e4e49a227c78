//! Key store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Debug;

use super::entity::{ApiToken, KeyRecord};
use crate::domain::DomainError;

/// Durable storage for key records.
///
/// Every method is a single atomic operation against the store. The pool
/// manager keeps no copy of record state between calls.
#[async_trait]
pub trait KeyStore: Send + Sync + Debug {
    /// Insert a new record. Fails with `Conflict` if the token already exists.
    async fn insert(&self, record: KeyRecord) -> Result<(), DomainError>;

    /// Get a record by token
    async fn lookup(&self, token: &ApiToken) -> Result<Option<KeyRecord>, DomainError>;

    /// Unused records that are not expired at `now`, oldest first
    async fn list_unused(&self, now: DateTime<Utc>) -> Result<Vec<KeyRecord>, DomainError>;

    /// Number of unused records that are not expired at `now`
    async fn count_unused(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        Ok(self.list_unused(now).await?.len())
    }

    /// Flip a record from Unused to Used if it is still unused.
    ///
    /// Returns true only for the call that performed the transition; a used or
    /// missing token yields false.
    async fn mark_used(&self, token: &ApiToken) -> Result<bool, DomainError>;

    /// Claim one unused, non-expired record and return it marked as used.
    ///
    /// The default walks the unused list and relies on `mark_used` being a
    /// conditional update, so a candidate lost to a concurrent caller is skipped.
    /// Implementors must never list a token again once `mark_used` has returned
    /// false for it; a store that does is reported as a storage error.
    async fn claim_unused(&self, now: DateTime<Utc>) -> Result<Option<KeyRecord>, DomainError> {
        let mut lost: HashSet<ApiToken> = HashSet::new();

        loop {
            let candidates = self.list_unused(now).await?;

            if candidates.is_empty() {
                return Ok(None);
            }

            if let Some(stale) = candidates.iter().find(|c| lost.contains(c.token())) {
                return Err(DomainError::storage(format!(
                    "Store listed API key '{}' as unused after it was claimed",
                    stale.token().fingerprint()
                )));
            }

            for mut candidate in candidates {
                if self.mark_used(candidate.token()).await? {
                    candidate.mark_used();
                    return Ok(Some(candidate));
                }

                lost.insert(candidate.token().clone());
            }
        }
    }

    /// Insert only as many of `records` as needed to bring the unused count at
    /// `now` up to `target`, as one atomic step. Returns the number inserted.
    async fn insert_up_to(
        &self,
        records: Vec<KeyRecord>,
        target: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, DomainError>;

    /// Delete a record. Returns true if it existed.
    async fn delete(&self, token: &ApiToken) -> Result<bool, DomainError>;
}
