//! In-memory key store implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiToken, KeyRecord, KeyStore};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Records {
    /// Records keyed by insertion sequence, so iteration is oldest first
    by_seq: BTreeMap<u64, KeyRecord>,
    /// Token -> insertion sequence
    index: HashMap<String, u64>,
    next_seq: u64,
}

impl Records {
    fn push(&mut self, record: KeyRecord) -> Result<(), DomainError> {
        let token = record.token().as_str().to_string();

        if self.index.contains_key(&token) {
            return Err(DomainError::conflict(format!(
                "API key '{}' already exists",
                record.token().fingerprint()
            )));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(token, seq);
        self.by_seq.insert(seq, record);
        Ok(())
    }

    fn get_mut(&mut self, token: &ApiToken) -> Option<&mut KeyRecord> {
        let seq = self.index.get(token.as_str())?;
        self.by_seq.get_mut(seq)
    }

    fn available(&self, now: DateTime<Utc>) -> impl Iterator<Item = &KeyRecord> {
        self.by_seq.values().filter(move |r| r.is_available_at(now))
    }
}

/// In-memory implementation of KeyStore
///
/// All records live behind one lock, so every trait call is atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryKeyStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records, used or not
    pub async fn len(&self) -> usize {
        self.records.read().await.by_seq.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn insert(&self, record: KeyRecord) -> Result<(), DomainError> {
        self.records.write().await.push(record)
    }

    async fn lookup(&self, token: &ApiToken) -> Result<Option<KeyRecord>, DomainError> {
        let records = self.records.read().await;

        Ok(records
            .index
            .get(token.as_str())
            .and_then(|seq| records.by_seq.get(seq))
            .cloned())
    }

    async fn list_unused(&self, now: DateTime<Utc>) -> Result<Vec<KeyRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.available(now).cloned().collect())
    }

    async fn count_unused(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let records = self.records.read().await;
        Ok(records.available(now).count())
    }

    async fn mark_used(&self, token: &ApiToken) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(token).map(|r| r.mark_used()).unwrap_or(false))
    }

    async fn claim_unused(&self, now: DateTime<Utc>) -> Result<Option<KeyRecord>, DomainError> {
        let mut records = self.records.write().await;

        let claimed = records
            .by_seq
            .values_mut()
            .find(|r| r.is_available_at(now))
            .map(|r| {
                r.mark_used();
                r.clone()
            });

        Ok(claimed)
    }

    async fn insert_up_to(
        &self,
        new_records: Vec<KeyRecord>,
        target: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, DomainError> {
        let mut records = self.records.write().await;

        let deficit = target.saturating_sub(records.available(now).count());
        let batch: Vec<KeyRecord> = new_records.into_iter().take(deficit).collect();

        // Reject the whole batch up front so a duplicate leaves the store unchanged
        let mut seen = HashSet::new();
        if let Some(duplicate) = batch.iter().find(|r| {
            let token = r.token().as_str();
            records.index.contains_key(token) || !seen.insert(token)
        }) {
            return Err(DomainError::conflict(format!(
                "API key '{}' already exists",
                duplicate.token().fingerprint()
            )));
        }

        let inserted = batch.len();
        for record in batch {
            records.push(record)?;
        }

        Ok(inserted)
    }

    async fn delete(&self, token: &ApiToken) -> Result<bool, DomainError> {
        let mut records = self.records.write().await;

        match records.index.remove(token.as_str()) {
            Some(seq) => {
                records.by_seq.remove(&seq);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::KeyStatus;
    use chrono::Duration;

    fn token(s: &str) -> ApiToken {
        ApiToken::new(s).unwrap()
    }

    fn create_test_record(s: &str, created_at: DateTime<Utc>) -> KeyRecord {
        KeyRecord::new(token(s), created_at, Duration::days(30))
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();
        let record = create_test_record("key-1", now);

        store.insert(record.clone()).await.unwrap();

        let retrieved = store.lookup(&token("key-1")).await.unwrap();
        assert_eq!(retrieved, Some(record));
        assert!(store.lookup(&token("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_token() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store.insert(create_test_record("key-1", now)).await.unwrap();
        let result = store.insert(create_test_record("key-1", now)).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_unused_in_insertion_order() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        for name in ["c", "a", "b"] {
            store.insert(create_test_record(name, now)).await.unwrap();
        }

        let unused: Vec<String> = store
            .list_unused(now)
            .await
            .unwrap()
            .iter()
            .map(|r| r.token().to_string())
            .collect();

        assert_eq!(unused, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_list_unused_excludes_used_and_expired() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store.insert(create_test_record("fresh", now)).await.unwrap();
        store.insert(create_test_record("used", now)).await.unwrap();
        store
            .insert(create_test_record("stale", now - Duration::days(31)))
            .await
            .unwrap();
        store.mark_used(&token("used")).await.unwrap();

        let unused = store.list_unused(now).await.unwrap();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].token().as_str(), "fresh");
        assert_eq!(store.count_unused(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_used_is_conditional() {
        let store = InMemoryKeyStore::new();
        store
            .insert(create_test_record("key-1", Utc::now()))
            .await
            .unwrap();

        assert!(store.mark_used(&token("key-1")).await.unwrap());
        assert!(!store.mark_used(&token("key-1")).await.unwrap());
        assert!(!store.mark_used(&token("missing")).await.unwrap());

        let record = store.lookup(&token("key-1")).await.unwrap().unwrap();
        assert_eq!(record.status(), KeyStatus::Used);
    }

    #[tokio::test]
    async fn test_claim_unused() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store.insert(create_test_record("first", now)).await.unwrap();
        store.insert(create_test_record("second", now)).await.unwrap();

        let claimed = store.claim_unused(now).await.unwrap().unwrap();
        assert_eq!(claimed.token().as_str(), "first");
        assert_eq!(claimed.status(), KeyStatus::Used);

        let stored = store.lookup(&token("first")).await.unwrap().unwrap();
        assert_eq!(stored.status(), KeyStatus::Used);

        store.claim_unused(now).await.unwrap().unwrap();
        assert!(store.claim_unused(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_unused_skips_expired() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store
            .insert(create_test_record("stale", now - Duration::days(31)))
            .await
            .unwrap();

        assert!(store.claim_unused(now).await.unwrap().is_none());

        let stale = store.lookup(&token("stale")).await.unwrap().unwrap();
        assert_eq!(stale.status(), KeyStatus::Unused);
    }

    #[tokio::test]
    async fn test_insert_up_to() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store.insert(create_test_record("existing", now)).await.unwrap();

        let batch = vec![
            create_test_record("n1", now),
            create_test_record("n2", now),
            create_test_record("n3", now),
        ];
        let inserted = store.insert_up_to(batch, 3, now).await.unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(store.count_unused(now).await.unwrap(), 3);
        assert!(store.lookup(&token("n3")).await.unwrap().is_none());

        let again = store
            .insert_up_to(vec![create_test_record("n4", now)], 3, now)
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_insert_up_to_conflict_inserts_nothing() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store.insert(create_test_record("existing", now)).await.unwrap();

        let batch = vec![
            create_test_record("n1", now),
            create_test_record("existing", now),
            create_test_record("n2", now),
        ];
        let result = store.insert_up_to(batch, 10, now).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(store.len().await, 1);
        assert!(store.lookup(&token("n1")).await.unwrap().is_none());

        let batch = vec![create_test_record("dup", now), create_test_record("dup", now)];
        let result = store.insert_up_to(batch, 10, now).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryKeyStore::new();
        store
            .insert(create_test_record("key-1", Utc::now()))
            .await
            .unwrap();

        assert!(store.delete(&token("key-1")).await.unwrap());
        assert!(!store.delete(&token("key-1")).await.unwrap());
        assert!(store.lookup(&token("key-1")).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reinsert_after_delete_goes_to_back() {
        let store = InMemoryKeyStore::new();
        let now = Utc::now();

        store.insert(create_test_record("a", now)).await.unwrap();
        store.insert(create_test_record("b", now)).await.unwrap();
        store.delete(&token("a")).await.unwrap();
        store.insert(create_test_record("a", now)).await.unwrap();

        let order: Vec<String> = store
            .list_unused(now)
            .await
            .unwrap()
            .iter()
            .map(|r| r.token().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
