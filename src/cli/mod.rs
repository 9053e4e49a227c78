//! CLI module for the API key pool
//!
//! A thin command layer over `KeyPoolManager`. With the default in-memory
//! backend the pool lives only as long as one invocation, so `demo` is the
//! useful command there; point `storage.backend` at PostgreSQL for the rest.

mod commands;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

pub use commands::execute;

/// API Key Pool - issue, validate and revoke pre-generated API keys
#[derive(Parser)]
#[command(name = "api-key-pool")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate a batch of new unused keys
    CreatePool {
        /// Number of keys (defaults to pool.size)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Top the pool up to a target number of unused keys
    Refill {
        /// Target pool size (defaults to pool.size)
        #[arg(short, long)]
        target: Option<usize>,
    },

    /// Issue one key from the pool
    Issue,

    /// Check whether a key exists and has not expired
    Validate {
        #[arg(value_name = "TOKEN")]
        token: String,
    },

    /// Check whether a key has expired
    CheckExpiration {
        #[arg(value_name = "TOKEN")]
        token: String,
    },

    /// Permanently remove a key
    Revoke {
        #[arg(value_name = "TOKEN")]
        token: String,
    },

    /// List the keys currently available for issuance
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending database migrations
    Migrate,

    /// Create a pool, issue every key, then refill to twice the pool size
    Demo,
}

/// Load configuration, run one command and release the store
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    let (manager, backend) = crate::create_pool_manager(&config).await?;

    let mut stdout = std::io::stdout();
    let result = execute(&manager, &backend, cli.command, &mut stdout).await;

    backend.close().await;
    result
}
