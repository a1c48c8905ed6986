//! In-memory item store
//!
//! Same contract as the PostgreSQL store: a commit lands whole or not at all,
//! and ids already present keep their first row. Backs `run --dry-run` and the
//! pipeline tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{CommitStats, ItemStore};
use crate::error::{IngestError, Result};
use crate::models::{Comment, CycleBatch, ItemId, Job, Poll, PollOption, Story};

/// Table contents keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTables {
    pub scrape: BTreeMap<ItemId, DateTime<Utc>>,
    pub stories: BTreeMap<ItemId, Story>,
    pub jobs: BTreeMap<ItemId, Job>,
    pub comments: BTreeMap<ItemId, Comment>,
    pub polls: BTreeMap<ItemId, Poll>,
    pub pollopts: BTreeMap<ItemId, PollOption>,
    pub deleted: BTreeSet<ItemId>,
    pub dead: BTreeSet<ItemId>,
    pub skipped: BTreeSet<ItemId>,
}

#[derive(Debug, Default)]
pub struct MemoryItemStore {
    tables: RwLock<MemoryTables>,
    fail_next_commit: AtomicBool,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing contents
    pub fn with_tables(tables: MemoryTables) -> Self {
        Self {
            tables: RwLock::new(tables),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Make the next commit fail with `StorageWriteFailure` and write nothing,
    /// as a crash before the transaction commits would.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> MemoryTables {
        self.tables.read().await.clone()
    }
}

fn insert_new<V>(table: &mut BTreeMap<ItemId, V>, id: ItemId, row: V) -> u64 {
    match table.entry(id) {
        std::collections::btree_map::Entry::Vacant(slot) => {
            slot.insert(row);
            1
        },
        std::collections::btree_map::Entry::Occupied(_) => 0,
    }
}

fn insert_ids(table: &mut BTreeSet<ItemId>, ids: &[ItemId]) -> u64 {
    ids.iter().filter(|id| table.insert(**id)).count() as u64
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn max_watermark_id(&self) -> Result<Option<ItemId>> {
        Ok(self.tables.read().await.scrape.keys().next_back().copied())
    }

    async fn commit(&self, batch: &CycleBatch) -> Result<CommitStats> {
        // Held for the whole commit so readers never see a partial cycle.
        let mut tables = self.tables.write().await;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(IngestError::storage(format!(
                "simulated failure committing {}",
                batch.range
            )));
        }

        let mut stats = CommitStats::default();
        for s in &batch.stories {
            stats.stories += insert_new(&mut tables.stories, s.id, s.clone());
        }
        for j in &batch.jobs {
            stats.jobs += insert_new(&mut tables.jobs, j.id, j.clone());
        }
        for c in &batch.comments {
            stats.comments += insert_new(&mut tables.comments, c.id, c.clone());
        }
        for p in &batch.polls {
            stats.polls += insert_new(&mut tables.polls, p.id, p.clone());
        }
        for o in &batch.poll_options {
            stats.poll_options += insert_new(&mut tables.pollopts, o.id, o.clone());
        }
        stats.deleted = insert_ids(&mut tables.deleted, &batch.deleted);
        stats.dead = insert_ids(&mut tables.dead, &batch.dead);
        stats.skipped = insert_ids(&mut tables.skipped, &batch.skipped);
        for w in &batch.watermarks {
            stats.watermarks += insert_new(&mut tables.scrape, w.id, w.processed_at);
        }

        Ok(stats)
    }
}
