//! hnpipe Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental ingestion of Hacker News items into a relational store.
//!
//! Each cycle reads the cursor (highest id in the watermark log), probes the
//! upstream maximum id, fetches the next bounded id range concurrently,
//! classifies and sanitizes every payload, and commits the whole cycle in one
//! transaction. The watermark only moves with that commit.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hnpipe_ingest::{HackerNewsClient, IngestConfig, IngestionLoop, MemoryItemStore};
//!
//! # async fn example() -> hnpipe_ingest::Result<()> {
//! let config = IngestConfig::from_env()?;
//! let source = Arc::new(HackerNewsClient::new(&config.upstream)?);
//! let store = Arc::new(MemoryItemStore::new());
//!
//! let summary = IngestionLoop::new(source, store, &config).run().await?;
//! println!("cursor now at {}", summary.final_cursor);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod upstream;

pub use classify::{classify, sanitize_text};
pub use config::IngestConfig;
pub use cursor::CursorStore;
pub use error::{IngestError, Result};
pub use fetcher::BatchFetcher;
pub use loader::BatchLoader;
pub use models::{ClassifiedItem, CycleBatch, IdRange, ItemId, ItemKind, ItemRecord};
pub use pipeline::{CycleOutcome, CycleReport, CycleState, IngestionLoop, RunSummary};
pub use store::{CommitStats, ItemStore, MemoryItemStore, PgItemStore};
pub use upstream::{HackerNewsClient, ItemSource, RawPayload};
