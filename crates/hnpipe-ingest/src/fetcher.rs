//! Batch fetcher
//!
//! Fetches every id of a range with at most `concurrency` requests in flight.
//! A single failed request aborts the whole batch; the cycle is retried from
//! the unchanged cursor, so a partial batch is never handed on.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::models::IdRange;
use crate::upstream::{ItemSource, RawPayload};

pub struct BatchFetcher {
    source: Arc<dyn ItemSource>,
    concurrency: usize,
}

impl BatchFetcher {
    pub fn new(source: Arc<dyn ItemSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// One payload per id of `range`, ordered by id
    pub async fn fetch_range(&self, range: IdRange) -> Result<Vec<RawPayload>> {
        let start = Instant::now();
        let source = &self.source;

        let mut payloads: Vec<RawPayload> = stream::iter(range.ids())
            .map(|id| async move { source.fetch_item(id).await })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        payloads.sort_unstable_by_key(|p| p.id);
        payloads.dedup_by_key(|p| p.id);

        let expected = range.len();
        if payloads.len() != expected || !payloads.iter().map(|p| p.id).eq(range.ids()) {
            return Err(IngestError::IncompleteFetch {
                start: range.start,
                end: range.end,
                expected,
                received: payloads.len(),
            });
        }

        debug!(
            range = %range,
            items = payloads.len(),
            concurrency = self.concurrency,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched batch"
        );
        Ok(payloads)
    }
}
