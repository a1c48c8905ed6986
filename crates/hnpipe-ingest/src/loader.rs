//! Batch loader
//!
//! Hands a cycle's [`CycleBatch`] to the store as one commit. A batch that
//! does not stamp every id of its range is refused before anything is written.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::models::CycleBatch;
use crate::store::{CommitStats, ItemStore};

pub struct BatchLoader {
    store: Arc<dyn ItemStore>,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, batch: &CycleBatch) -> Result<CommitStats> {
        if !batch.covers_range() {
            return Err(IngestError::IncompleteFetch {
                start: batch.range.start,
                end: batch.range.end,
                expected: batch.range.len(),
                received: batch.watermarks.len(),
            });
        }

        let start = Instant::now();
        let written = self.store.commit(batch).await?;

        let expected = batch.stats();
        if written.watermarks < expected.watermarks as u64 {
            // Ids already in the log keep their first row.
            warn!(
                range = %batch.range,
                already_present = expected.watermarks as u64 - written.watermarks,
                "Some ids were already recorded"
            );
        }

        debug!(
            range = %batch.range,
            rows = written.total(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch committed"
        );
        Ok(written)
    }
}
