pub mod client;
pub mod page;
pub mod task;

pub use client::{AcquisitionError, CrawlerClient, CrawlerConfig, SearchOptions};
pub use page::PageRecord;
pub use task::{ResearchTask, ValidationError};

use async_trait::async_trait;

/// Anything that can turn a research task into crawled pages.
///
/// `max_pages` is forwarded to the source and never enforced locally.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, task: &ResearchTask) -> Result<Vec<PageRecord>, AcquisitionError>;
}
