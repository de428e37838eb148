use crate::types::{CrawlTarget, FetchedDetail, Result};
use async_trait::async_trait;

/// Trait for crawling one exchange's announcement site
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Exchange identifier used for artifact paths and report columns
    fn exchange(&self) -> &str;

    /// Discover candidate announcements, newest first
    async fn list(&self) -> Result<Vec<CrawlTarget>>;

    /// Fetch the raw body of one announcement
    async fn detail(&self, target: &CrawlTarget) -> Result<FetchedDetail>;
}
