//! Engine configuration, read from the environment (and `.env` when present).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use tradeledger_observability::{LogConfig, LogFormat};

use crate::store::{InMemoryStore, PostgresStore, SharedStore};

pub const DATABASE_URL: &str = "TRADELEDGER_DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "TRADELEDGER_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_SECS: &str = "TRADELEDGER_ACQUIRE_TIMEOUT_SECS";
pub const LOG_FORMAT: &str = "TRADELEDGER_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `None` selects the in-memory backend.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(3),
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Load `.env` (if any), then read the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let database_url = lookup(DATABASE_URL).filter(|url| !url.trim().is_empty());

        let max_connections = match lookup(MAX_CONNECTIONS) {
            Some(raw) => {
                let value: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| {
                        format!("{MAX_CONNECTIONS} must be a positive integer, got '{raw}'")
                    })?;
                if value == 0 {
                    bail!("{MAX_CONNECTIONS} must be at least 1");
                }
                value
            }
            None => defaults.max_connections,
        };

        let acquire_timeout = match lookup(ACQUIRE_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| {
                        format!("{ACQUIRE_TIMEOUT_SECS} must be whole seconds, got '{raw}'")
                    })?,
            ),
            None => defaults.acquire_timeout,
        };

        let log_format = match lookup(LOG_FORMAT).as_deref().map(str::trim) {
            None | Some("json") => LogFormat::Json,
            Some("text") => LogFormat::Text,
            Some(other) => bail!("{LOG_FORMAT} must be 'json' or 'text', got '{other}'"),
        };

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout,
            log_format,
        })
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            ..LogConfig::default()
        }
    }
}

/// Connect a pool and apply the bundled schema.
pub async fn connect_postgres(config: &EngineConfig) -> anyhow::Result<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .context("no database URL configured")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    PostgresStore::new(pool.clone())
        .migrate()
        .await
        .context("failed to apply schema")?;

    info!(max_connections = config.max_connections, "database connection established");
    Ok(pool)
}

/// Backend selected by `config`: Postgres when a URL is set, in-memory otherwise.
pub async fn open_store(config: &EngineConfig) -> anyhow::Result<SharedStore> {
    if config.database_url.is_some() {
        let pool = connect_postgres(config).await?;
        Ok(Arc::new(PostgresStore::new(pool)))
    } else {
        info!("no database configured, using the in-memory store");
        Ok(Arc::new(InMemoryStore::new()))
    }
}
