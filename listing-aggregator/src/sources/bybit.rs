use crate::fetcher::Fetcher;
use crate::traits::SiteAdapter;
use crate::types::{AggregatorError, ContentFormat, CrawlTarget, FetchConfig, FetchedDetail, Result};
use crate::utils::{hash::sha256_hex, time::parse_timestamp};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

const SEARCH_URL: &str = "https://announcements.bybit.com/x-api/announcements/api/search/v1/index/announcement-posts_en";
const SITE_URL: &str = "https://announcements.bybit.com/en";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    title: String,
    url: String,
    #[serde(default)]
    publish_time: Option<i64>,
    #[serde(default)]
    date_timestamp: Option<i64>,
}

/// Bybit announcement search index (new crypto and delisting categories).
/// Bybit exposes no stable article id, so keys are hashes of the article URL.
pub struct BybitAdapter {
    fetcher: Fetcher,
    search_url: String,
    site_url: String,
    hits_per_page: u32,
}

impl BybitAdapter {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
            search_url: SEARCH_URL.to_string(),
            site_url: SITE_URL.to_string(),
            hits_per_page: 20,
        })
    }

    /// Point both the search API and the article pages at another host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.search_url = format!("{}/x-api/announcements/api/search/v1/index/announcement-posts_en", base);
        self.site_url = format!("{}/en", base);
        self
    }

    async fn search(&self, category: &str) -> Result<Vec<CrawlTarget>> {
        let body = json!({
            "data": {
                "query": "",
                "page": 0,
                "hitsPerPage": self.hits_per_page,
                "filters": format!("category.key: '{}'", category),
            }
        });
        let response: SearchResponse = self.fetcher.post_json(&self.search_url, &body).await?;

        let site = Url::parse(&format!("{}/", self.site_url))?;
        let mut targets = Vec::new();
        for hit in response.result.hits {
            let url = match site.join(hit.url.trim_start_matches('/')) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    warn!("Skipping Bybit hit with bad url {}: {}", hit.url, e);
                    continue;
                }
            };
            let release = hit
                .publish_time
                .or(hit.date_timestamp)
                .and_then(|ts| parse_timestamp(&ts.to_string()));
            targets.push(CrawlTarget {
                exchange: self.exchange().to_string(),
                key: sha256_hex(&url),
                title: hit.title,
                locator: hit.url,
                url,
                release_hint: release,
            });
        }
        Ok(targets)
    }
}

#[async_trait]
impl SiteAdapter for BybitAdapter {
    fn exchange(&self) -> &str {
        "bybit"
    }

    async fn list(&self) -> Result<Vec<CrawlTarget>> {
        let mut targets = Vec::new();
        for category in ["new_crypto", "delistings"] {
            match self.search(category).await {
                Ok(found) => {
                    info!("Bybit category {}: {} announcements", category, found.len());
                    targets.extend(found);
                }
                Err(e) => warn!("Failed to search Bybit category {}: {}", category, e),
            }
        }
        if targets.is_empty() {
            return Err(AggregatorError::General("Bybit search returned nothing".to_string()));
        }
        Ok(targets)
    }

    async fn detail(&self, target: &CrawlTarget) -> Result<FetchedDetail> {
        let html = self.fetcher.get_text(&target.url).await?;
        let article = next_data_article(&html)
            .ok_or_else(|| AggregatorError::Parse(format!("no article data in Bybit page {}", target.url)))?;

        let release_time = article
            .get("publish_time")
            .or_else(|| article.get("date_timestamp"))
            .and_then(|v| v.as_i64())
            .and_then(|ts| parse_timestamp(&ts.to_string()));

        let content = json!({
            "title": article.get("title").cloned().unwrap_or(Value::Null),
            "description": article.get("description").cloned().unwrap_or(Value::Null),
            "date": article.get("date").cloned().unwrap_or(Value::Null),
            "content": article.get("content").cloned().unwrap_or(Value::Null),
        });

        Ok(FetchedDetail {
            content: content.to_string(),
            format: ContentFormat::Json,
            release_time,
        })
    }
}

/// `props.pageProps.articleDetail` from the page's `__NEXT_DATA__` script.
fn next_data_article(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let script = document.select(&selector).next()?;
    let raw: String = script.text().collect();
    let data: Value = serde_json::from_str(raw.trim()).ok()?;
    data.pointer("/props/pageProps/articleDetail").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_article_from_next_data() {
        let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
            {"props":{"pageProps":{"articleDetail":{"title":"Delisting of BAR/USDT","date":"2025-08-01"}}}}
        </script></body></html>"#;
        let article = next_data_article(html).unwrap();
        assert_eq!(article["title"], "Delisting of BAR/USDT");
    }

    #[test]
    fn pages_without_next_data_yield_none() {
        assert!(next_data_article("<html><body><p>hi</p></body></html>").is_none());
    }
}
