//! Ingestion cursor
//!
//! The cursor is never stored on its own: it is the highest id in the
//! watermark log, which only grows inside a committed cycle.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::models::ItemId;
use crate::store::ItemStore;

pub struct CursorStore {
    store: Arc<dyn ItemStore>,
    start_id: ItemId,
}

impl CursorStore {
    /// `start_id` is the cursor reported while the watermark log is empty,
    /// so the first cycle begins at `start_id + 1`.
    pub fn new(store: Arc<dyn ItemStore>, start_id: ItemId) -> Self {
        Self { store, start_id }
    }

    /// Highest id known to be fully processed
    pub async fn last_processed_id(&self) -> Result<ItemId> {
        let cursor = match self.store.max_watermark_id().await? {
            Some(max) => max,
            None => {
                debug!(start_id = self.start_id, "Watermark log empty, using start id");
                self.start_id
            },
        };
        Ok(cursor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::models::{ClassifiedItem, CycleBatch, IdRange};
    use crate::store::MemoryItemStore;
    use crate::upstream::RawPayload;
    use chrono::Utc;

    #[tokio::test]
    async fn test_empty_log_reports_start_id() {
        let cursor = CursorStore::new(Arc::new(MemoryItemStore::new()), 0);
        assert_eq!(cursor.last_processed_id().await.unwrap(), 0);

        let cursor = CursorStore::new(Arc::new(MemoryItemStore::new()), 40_000);
        assert_eq!(cursor.last_processed_id().await.unwrap(), 40_000);
    }

    #[tokio::test]
    async fn test_cursor_is_max_watermark() {
        let store = Arc::new(MemoryItemStore::new());
        let range = IdRange { start: 1, end: 9 };
        let batch = CycleBatch::from_classified(range, Vec::<ClassifiedItem>::new(), Utc::now());
        // An empty batch writes no watermarks.
        store.commit(&batch).await.unwrap();

        let cursor = CursorStore::new(store.clone(), 3);
        assert_eq!(cursor.last_processed_id().await.unwrap(), 3);

        let items = range
            .ids()
            .map(|id| classify(&RawPayload::new(id, serde_json::Value::Null)));
        store
            .commit(&CycleBatch::from_classified(range, items, Utc::now()))
            .await
            .unwrap();
        assert_eq!(cursor.last_processed_id().await.unwrap(), 9);
    }
}
