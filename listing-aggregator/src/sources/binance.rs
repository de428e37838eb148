use crate::fetcher::Fetcher;
use crate::traits::SiteAdapter;
use crate::types::{AggregatorError, ContentFormat, CrawlTarget, FetchConfig, FetchedDetail, Result};
use crate::utils::time::from_epoch_millis;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

const BASE_URL: &str = "https://www.binance.com";
const LISTING_CATALOG: u32 = 48;
const DELISTING_CATALOG: u32 = 161;
const OK_CODE: &str = "000000";

#[derive(Debug, Deserialize)]
struct ListResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    catalogs: Vec<Catalog>,
}

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    code: String,
    title: String,
    #[serde(default)]
    release_date: Option<i64>, // milliseconds
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailData {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    publish_date: Option<i64>,
}

/// Binance CMS announcements: new-listing and delisting catalogs.
pub struct BinanceAdapter {
    fetcher: Fetcher,
    base_url: String,
    page_size: u32,
}

impl BinanceAdapter {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
            base_url: BASE_URL.to_string(),
            page_size: 20,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    async fn list_catalog(&self, catalog_id: u32) -> Result<Vec<CrawlTarget>> {
        let url = format!(
            "{}/bapi/apex/v1/public/apex/cms/article/list/query?type=1&pageNo=1&pageSize={}&catalogId={}",
            self.base_url, self.page_size, catalog_id
        );
        let response: ListResponse = self.fetcher.get_json(&url).await?;

        if response.code != OK_CODE {
            return Err(AggregatorError::Parse(format!(
                "Binance list API returned code {} ({})",
                response.code,
                response.message.unwrap_or_default()
            )));
        }

        let articles = response
            .data
            .and_then(|d| d.catalogs.into_iter().next())
            .map(|c| c.articles)
            .unwrap_or_default();

        Ok(articles
            .into_iter()
            .map(|article| CrawlTarget {
                exchange: self.exchange().to_string(),
                key: article.code.clone(),
                url: format!("{}/en/support/announcement/detail/{}", self.base_url, article.code),
                title: article.title,
                release_hint: article.release_date.and_then(from_epoch_millis),
                locator: article.code,
            })
            .collect())
    }
}

#[async_trait]
impl SiteAdapter for BinanceAdapter {
    fn exchange(&self) -> &str {
        "binance"
    }

    async fn list(&self) -> Result<Vec<CrawlTarget>> {
        let mut targets = Vec::new();
        let mut failures = Vec::new();

        for catalog_id in [LISTING_CATALOG, DELISTING_CATALOG] {
            match self.list_catalog(catalog_id).await {
                Ok(found) => {
                    info!("Binance catalog {}: {} announcements", catalog_id, found.len());
                    targets.extend(found);
                }
                Err(e) => {
                    warn!("Failed to list Binance catalog {}: {}", catalog_id, e);
                    failures.push(e);
                }
            }
        }

        if targets.is_empty() {
            if let Some(e) = failures.into_iter().next() {
                return Err(e);
            }
        }

        targets.sort_by(|a, b| b.release_hint.cmp(&a.release_hint));
        Ok(targets)
    }

    async fn detail(&self, target: &CrawlTarget) -> Result<FetchedDetail> {
        let url = format!(
            "{}/bapi/apex/v1/public/cms/article/detail/query?articleCode={}",
            self.base_url, target.locator
        );
        let response: DetailResponse = self.fetcher.get_json(&url).await?;

        if response.code != OK_CODE {
            return Err(AggregatorError::Parse(format!(
                "Binance detail API returned code {} for {} ({})",
                response.code,
                target.key,
                response.message.unwrap_or_default()
            )));
        }

        let data = response
            .data
            .ok_or_else(|| AggregatorError::Parse(format!("Binance detail for {} has no data", target.key)))?;
        let body = data.body.unwrap_or_default();
        let format = if body.trim_start().starts_with('{') {
            ContentFormat::Json
        } else {
            ContentFormat::Html
        };

        Ok(FetchedDetail {
            content: body,
            format,
            release_time: data.publish_date.and_then(from_epoch_millis),
        })
    }
}
