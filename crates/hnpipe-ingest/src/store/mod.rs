//! Storage seam
//!
//! An [`ItemStore`] persists a whole [`CycleBatch`] atomically and reports the
//! highest id in its watermark log. Inserts are ignore-on-conflict: an id
//! already present in a table keeps its first row.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{CycleBatch, ItemId};

pub use memory::{MemoryItemStore, MemoryTables};
pub use postgres::{connect, migrate, PgItemStore};

/// Rows actually written by one commit, per table.
/// Lower than the batch counts when ids were already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub watermarks: u64,
    pub stories: u64,
    pub jobs: u64,
    pub comments: u64,
    pub polls: u64,
    pub poll_options: u64,
    pub deleted: u64,
    pub dead: u64,
    pub skipped: u64,
}

impl CommitStats {
    pub fn total(&self) -> u64 {
        self.watermarks
            + self.stories
            + self.jobs
            + self.comments
            + self.polls
            + self.poll_options
            + self.deleted
            + self.dead
            + self.skipped
    }
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Highest id in the watermark log, `None` when the log is empty
    async fn max_watermark_id(&self) -> Result<Option<ItemId>>;

    /// Write every table's share of `batch` in one all-or-nothing unit.
    /// Fails with `StorageWriteFailure`, leaving nothing written.
    async fn commit(&self, batch: &CycleBatch) -> Result<CommitStats>;
}
