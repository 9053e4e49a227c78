//! PostgreSQL key store implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::domain::api_key::{ApiToken, KeyRecord, KeyStatus, KeyStore};
use crate::domain::DomainError;
use crate::infrastructure::storage::PostgresConfig;

/// Advisory lock key serializing pool top-ups across processes ("apikpool")
const POOL_LOCK_KEY: i64 = 0x6170_696b_706f_6f6c;

const RECORD_COLUMNS: &str = "token, status, expires_at, created_at";

/// PostgreSQL implementation of KeyStore
#[derive(Debug, Clone)]
pub struct PostgresKeyStore {
    pool: PgPool,
}

impl PostgresKeyStore {
    /// Create a store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool and create the store
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        Ok(Self::new(config.connect().await?))
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Release all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL key store closed");
    }
}

fn row_to_record(row: &PgRow) -> Result<KeyRecord, DomainError> {
    let map_err = |e: sqlx::Error| DomainError::storage(format!("Failed to read key row: {}", e));

    let token: String = row.try_get("token").map_err(map_err)?;
    let status: String = row.try_get("status").map_err(map_err)?;
    let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(map_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_err)?;

    let token = ApiToken::new(token)
        .map_err(|e| DomainError::storage(format!("Stored token is malformed: {}", e)))?;
    let status = KeyStatus::parse(&status)
        .ok_or_else(|| DomainError::storage(format!("Unknown key status '{}'", status)))?;

    Ok(KeyRecord::from_parts(token, status, expires_at, created_at))
}

fn insert_error(record: &KeyRecord, e: sqlx::Error) -> DomainError {
    let unique_violation = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if unique_violation {
        DomainError::conflict(format!(
            "API key '{}' already exists",
            record.token().fingerprint()
        ))
    } else {
        DomainError::storage(format!("Failed to insert API key: {}", e))
    }
}

#[async_trait]
impl KeyStore for PostgresKeyStore {
    async fn insert(&self, record: KeyRecord) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO api_keys (token, status, expires_at, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.token().as_str())
        .bind(record.status().as_str())
        .bind(record.expires_at())
        .bind(record.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(&record, e))?;

        Ok(())
    }

    async fn lookup(&self, token: &ApiToken) -> Result<Option<KeyRecord>, DomainError> {
        let query = format!("SELECT {} FROM api_keys WHERE token = $1", RECORD_COLUMNS);

        let row = sqlx::query(&query)
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_unused(&self, now: DateTime<Utc>) -> Result<Vec<KeyRecord>, DomainError> {
        let query = format!(
            "SELECT {} FROM api_keys WHERE status = 'unused' AND expires_at >= $1 \
             ORDER BY created_at, token",
            RECORD_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list unused API keys: {}", e)))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count_unused(&self, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM api_keys WHERE status = 'unused' AND expires_at >= $1",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count unused API keys: {}", e)))?;

        Ok(count as usize)
    }

    async fn mark_used(&self, token: &ApiToken) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE api_keys SET status = 'used' WHERE token = $1 AND status = 'unused'",
        )
        .bind(token.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to mark API key used: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_unused(&self, now: DateTime<Utc>) -> Result<Option<KeyRecord>, DomainError> {
        // SKIP LOCKED lets concurrent claimers move on to the next candidate
        // instead of queueing behind the same row
        let query = format!(
            r#"
            UPDATE api_keys SET status = 'used'
            WHERE status = 'unused' AND token = (
                SELECT token FROM api_keys
                WHERE status = 'unused' AND expires_at >= $1
                ORDER BY created_at, token
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to claim API key: {}", e)))?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn insert_up_to(
        &self,
        records: Vec<KeyRecord>,
        target: usize,
        now: DateTime<Utc>,
    ) -> Result<usize, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        // Held until commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(POOL_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to lock key pool: {}", e)))?;

        let available: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM api_keys WHERE status = 'unused' AND expires_at >= $1",
        )
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count unused API keys: {}", e)))?;

        let deficit = target.saturating_sub(available as usize);
        let mut inserted = 0;

        for record in records.into_iter().take(deficit) {
            sqlx::query(
                "INSERT INTO api_keys (token, status, expires_at, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(record.token().as_str())
            .bind(record.status().as_str())
            .bind(record.expires_at())
            .bind(record.created_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error(&record, e))?;

            inserted += 1;
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit pool refill: {}", e)))?;

        Ok(inserted)
    }

    async fn delete(&self, token: &ApiToken) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE token = $1")
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete API key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
