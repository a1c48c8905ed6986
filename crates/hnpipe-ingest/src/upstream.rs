//! Upstream item API
//!
//! [`ItemSource`] is the seam the pipeline fetches through;
//! [`HackerNewsClient`] implements it over HTTP:
//!
//! - `GET {base}/v0/maxitem.json` -> plain integer body
//! - `GET {base}/v0/item/{id}.json` -> JSON object, or `null`
//!
//! Any non-success status is [`IngestError::UpstreamUnavailable`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::trace;

use crate::config::UpstreamConfig;
use crate::error::{IngestError, Result};
use crate::models::ItemId;

/// Raw JSON for one requested id
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    /// The id that was requested (not read from the body)
    pub id: ItemId,
    pub body: Value,
}

impl RawPayload {
    pub fn new(id: ItemId, body: Value) -> Self {
        Self { id, body }
    }
}

/// Source of items and of the current maximum item id
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Current maximum item id
    async fn max_available_id(&self) -> Result<ItemId>;

    /// Payload for one item id
    async fn fetch_item(&self, id: ItemId) -> Result<RawPayload>;
}

/// HTTP client for the Hacker News Firebase API
pub struct HackerNewsClient {
    client: Client,
    base_url: String,
}

impl HackerNewsClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| IngestError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn max_item_url(&self) -> String {
        format!("{}/v0/maxitem.json", self.base_url)
    }

    pub fn item_url(&self, id: ItemId) -> String {
        format!("{}/v0/item/{}.json", self.base_url, id)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::upstream(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::upstream(url, status));
        }

        Ok(response)
    }
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn max_available_id(&self) -> Result<ItemId> {
        let url = self.max_item_url();
        let body = self
            .get(&url)
            .await?
            .text()
            .await
            .map_err(|e| IngestError::upstream(&url, e))?;

        body.trim()
            .parse::<ItemId>()
            .map_err(|e| IngestError::InvalidResponse {
                url,
                reason: format!("expected an integer body, got {:?}: {e}", body.trim()),
            })
    }

    async fn fetch_item(&self, id: ItemId) -> Result<RawPayload> {
        let url = self.item_url(id);
        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| IngestError::upstream(&url, e))?;

        let body: Value =
            serde_json::from_slice(&bytes).map_err(|e| IngestError::InvalidResponse {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        trace!(id, bytes = bytes.len(), "Fetched item");
        Ok(RawPayload::new(id, body))
    }
}
