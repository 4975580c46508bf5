//! Article feed clients.

pub mod pubmed;

use async_trait::async_trait;

/// One fetch from an upstream feed: the ids found and the raw markup for them.
#[derive(Debug, Clone, Default)]
pub struct FeedBatch {
    pub ids: Vec<String>,
    pub xml: String,
}

/// Upstream source of article markup.
#[async_trait]
pub trait ArticleFeed: Send + Sync {
    /// Fetch the most recent batch. An empty `ids` list means nothing matched.
    async fn fetch_recent(&self) -> anyhow::Result<FeedBatch>;
}
