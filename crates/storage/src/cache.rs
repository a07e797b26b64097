//! Commonality cache regeneration endpoint.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::instrument;

use voluspa_common::{CommonalityCache, ScrapeError, ScrapeResult};

pub struct HttpCommonalityCache {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpCommonalityCache {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> ScrapeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build cache client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    #[must_use]
    pub fn url(&self, scrape_id: u64) -> String {
        format!("{}/Generate/Commonality?id={scrape_id}", self.base_url)
    }
}

#[async_trait]
impl CommonalityCache for HttpCommonalityCache {
    #[instrument(skip(self))]
    async fn invalidate(&self, scrape_id: u64) -> ScrapeResult<()> {
        self.client
            .get(self.url(scrape_id))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;
        Ok(())
    }
}
