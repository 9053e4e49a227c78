//! Command handlers

use std::io::Write;

use crate::domain::api_key::KeyStore;
use crate::domain::DomainError;
use crate::infrastructure::api_key::KeyPoolManager;
use crate::infrastructure::storage::migrations::{run_key_pool_migrations, PostgresMigrator};
use crate::infrastructure::storage::KeyStoreBackend;

use super::Command;

/// Run a single command against the manager, writing results to `out`
pub async fn execute<S, W>(
    manager: &KeyPoolManager<S>,
    backend: &KeyStoreBackend,
    command: Command,
    out: &mut W,
) -> anyhow::Result<()>
where
    S: KeyStore + ?Sized,
    W: Write,
{
    let pool_size = manager.settings().pool_size();

    match command {
        Command::CreatePool { size } => {
            let inserted = manager.create_pool(size.unwrap_or(pool_size)).await?;
            writeln!(out, "Created {} API keys.", inserted)?;
        }
        Command::Refill { target } => {
            let inserted = manager.refill_pool(target.unwrap_or(pool_size)).await?;
            writeln!(out, "Inserted {} API keys.", inserted)?;
        }
        Command::Issue => {
            let token = issue(manager).await?;
            writeln!(out, "{}", token)?;
        }
        Command::Validate { token } => {
            if manager.validate(&token).await? {
                writeln!(out, "API key is valid.")?;
            } else {
                writeln!(out, "API key is not valid.")?;
            }
        }
        Command::CheckExpiration { token } => {
            if manager.is_expired(&token).await? {
                writeln!(out, "API key has expired.")?;
            } else {
                writeln!(out, "API key is still valid.")?;
            }
        }
        Command::Revoke { token } => {
            if manager.revoke(&token).await? {
                writeln!(out, "API key revoked.")?;
            } else {
                writeln!(out, "API key did not exist; nothing to revoke.")?;
            }
        }
        Command::List { json } => {
            let records = manager.list_available().await?;

            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
            } else {
                for record in &records {
                    writeln!(out, "{}\t{}", record.token(), record.expires_at().to_rfc3339())?;
                }
            }
        }
        Command::Migrate => match backend {
            KeyStoreBackend::Postgres(store) => {
                let applied = run_key_pool_migrations(store.pool()).await?;
                let version = PostgresMigrator::new(store.pool().clone())
                    .current_version()
                    .await?;
                writeln!(
                    out,
                    "Applied {} migration(s); schema version {}.",
                    applied,
                    version.unwrap_or(0)
                )?;
            }
            KeyStoreBackend::InMemory(_) => {
                writeln!(out, "In-memory backend has no schema; nothing to migrate.")?;
            }
        },
        Command::Demo => {
            manager.create_pool(pool_size).await?;

            writeln!(out, "Issued keys:")?;
            for _ in 0..pool_size {
                writeln!(out, "{}", issue(manager).await?)?;
            }

            writeln!(out, "Remaining unused keys:")?;
            for record in manager.list_available().await? {
                writeln!(out, "{}", record.token())?;
            }

            manager.refill_pool(pool_size * 2).await?;

            writeln!(out, "Pool after refill:")?;
            for record in manager.list_available().await? {
                writeln!(out, "{}", record.token())?;
            }
        }
    }

    Ok(())
}

async fn issue<S>(manager: &KeyPoolManager<S>) -> anyhow::Result<String>
where
    S: KeyStore + ?Sized,
{
    match manager.issue_key().await {
        Ok(token) => Ok(token.to_string()),
        Err(e @ DomainError::PoolExhausted { .. }) => Err(anyhow::Error::new(e)
            .context("No keys left to issue; run `api-key-pool refill` and try again")),
        Err(e) => Err(e.into()),
    }
}
