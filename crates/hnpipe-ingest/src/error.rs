//! Error types for the ingestion pipeline
//!
//! Every variant here is fatal for the cycle that raised it: the watermark is
//! left untouched and the whole run can be retried. Per-item problems
//! (missing type tag, fields that fail to coerce) never become errors; they are
//! absorbed into the data model as skip markers and null columns.

use crate::models::ItemId;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Non-success status or transport failure talking to the item API
    #[error("Upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    /// The item API answered 200 with a body we cannot use
    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Incomplete fetch for ids {start}..={end}: expected {expected} payloads, got {received}")]
    IncompleteFetch {
        start: ItemId,
        end: ItemId,
        expected: usize,
        received: usize,
    },

    /// The cycle's transactional commit did not complete
    #[error("Storage write failed: {0}")]
    StorageWriteFailure(#[source] BoxError),

    #[error("Watermark did not advance: expected at least {expected}, found {found}")]
    WatermarkNotAdvanced { expected: ItemId, found: ItemId },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn upstream(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn storage(source: impl Into<BoxError>) -> Self {
        Self::StorageWriteFailure(source.into())
    }
}

impl From<hnpipe_common::CommonError> for IngestError {
    fn from(err: hnpipe_common::CommonError) -> Self {
        IngestError::Config(err.to_string())
    }
}
