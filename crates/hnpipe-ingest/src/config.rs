//! Ingestion configuration
//!
//! Loaded from the environment (and `.env`) by [`IngestConfig::from_env`];
//! the CLI applies its flags on top.

use hnpipe_common::env::{env_flag, env_opt, env_or};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{IngestError, Result};
use crate::models::ItemId;

// ============================================================================
// Defaults
// ============================================================================

/// Public Hacker News item API
pub const DEFAULT_UPSTREAM_URL: &str = "https://hacker-news.firebaseio.com";

/// Ids fetched per cycle
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Simultaneous in-flight item requests
pub const DEFAULT_CONCURRENCY: usize = 64;

/// Cursor assumed when the watermark log is empty; ingestion starts at id 1
pub const DEFAULT_START_ID: ItemId = 0;

/// Rows per multi-row INSERT statement
pub const DEFAULT_STORE_CHUNK_SIZE: usize = 1000;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/hndb";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Upstream HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL; `/v0/...` paths are appended
    pub base_url: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            request_timeout_secs: None,
            user_agent: concat!("hnpipe-ingest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Rows per multi-row INSERT
    pub chunk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            chunk_size: DEFAULT_STORE_CHUNK_SIZE,
        }
    }
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub upstream: UpstreamConfig,
    pub database: DatabaseConfig,
    /// Maximum ids fetched per cycle
    pub batch_size: usize,
    /// Maximum simultaneous item fetches, independent of `batch_size`
    pub concurrency: usize,
    /// Cursor used when no watermark exists yet
    pub start_id: ItemId,
    /// Per-cycle timing output at info level
    pub verbose: bool,
    /// Stop after this many committed cycles
    pub max_cycles: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            database: DatabaseConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            start_id: DEFAULT_START_ID,
            verbose: false,
            max_cycles: None,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// - `HNPIPE_UPSTREAM_URL`, `HNPIPE_REQUEST_TIMEOUT_SECS`
    /// - `HNPIPE_BATCH_SIZE`, `HNPIPE_CONCURRENCY`, `HNPIPE_START_ID`
    /// - `HNPIPE_VERBOSE`, `HNPIPE_MAX_CYCLES`, `HNPIPE_STORE_CHUNK_SIZE`
    /// - `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `DB_CONNECT_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            upstream: UpstreamConfig {
                base_url: env_or("HNPIPE_UPSTREAM_URL", defaults.upstream.base_url)?,
                request_timeout_secs: env_opt("HNPIPE_REQUEST_TIMEOUT_SECS")?,
                user_agent: defaults.upstream.user_agent,
            },
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", defaults.database.url)?,
                max_connections: env_or("DB_MAX_CONNECTIONS", defaults.database.max_connections)?,
                connect_timeout_secs: env_or(
                    "DB_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout_secs,
                )?,
                chunk_size: env_or("HNPIPE_STORE_CHUNK_SIZE", defaults.database.chunk_size)?,
            },
            batch_size: env_or("HNPIPE_BATCH_SIZE", defaults.batch_size)?,
            concurrency: env_or("HNPIPE_CONCURRENCY", defaults.concurrency)?,
            start_id: env_or("HNPIPE_START_ID", defaults.start_id)?,
            verbose: env_flag("HNPIPE_VERBOSE", defaults.verbose)?,
            max_cycles: env_opt("HNPIPE_MAX_CYCLES")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(IngestError::Config("Upstream URL cannot be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(IngestError::Config("Batch size must be greater than 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(IngestError::Config("Concurrency must be greater than 0".to_string()));
        }
        if self.start_id < 0 {
            return Err(IngestError::Config(format!(
                "Start id cannot be negative (got {})",
                self.start_id
            )));
        }
        if self.max_cycles == Some(0) {
            return Err(IngestError::Config("Max cycles must be greater than 0".to_string()));
        }
        if self.database.chunk_size == 0 {
            return Err(IngestError::Config("Store chunk size must be greater than 0".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(IngestError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }
        if self.concurrency > self.batch_size {
            tracing::debug!(
                concurrency = self.concurrency,
                batch_size = self.batch_size,
                "Concurrency exceeds batch size; at most batch_size requests will be in flight"
            );
        }
        Ok(())
    }
}
