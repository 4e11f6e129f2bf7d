//! Feed collaborators. The pipeline only depends on the `Feed` trait; the
//! shipped adapter is a generic JSON endpoint fetcher so site-specific
//! parsing stays outside the core.

use crate::models::signal::{RawItem, Source};
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
pub trait Feed: Send + Sync {
    fn name(&self) -> &str;
    /// Latest candidate items. `id` must be stable for the same logical
    /// item across refetches.
    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawItem>>;
}

/// Fetches a URL expected to return a JSON array of raw items.
pub struct JsonFeed {
    source: Source,
    url: String,
    client: reqwest::Client,
}

impl JsonFeed {
    pub fn new(source: Source, url: String) -> Self {
        Self {
            source,
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Feed for JsonFeed {
    fn name(&self) -> &str {
        self.source.as_str()
    }

    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawItem>> {
        let res = self.client.get(&self.url).send().await?;
        anyhow::ensure!(
            res.status().is_success(),
            "feed {} returned {}",
            self.name(),
            res.status()
        );
        let mut items: Vec<RawItem> = res.json().await?;
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        for item in &mut items {
            item.source = self.source.clone();
            if item.detected_at.is_empty() {
                item.detected_at = now.clone();
            }
        }
        Ok(items)
    }
}
