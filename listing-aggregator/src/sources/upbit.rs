use crate::fetcher::Fetcher;
use crate::traits::SiteAdapter;
use crate::types::{AggregatorError, ContentFormat, CrawlTarget, FetchConfig, FetchedDetail, Result};
use crate::utils::time::parse_timestamp;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

const API_URL: &str = "https://api-manager.upbit.com";
const SITE_URL: &str = "https://upbit.com/service_center/notice";

#[derive(Debug, Deserialize)]
struct NoticeListResponse {
    #[serde(default)]
    success: Option<bool>,
    data: NoticeListData,
}

#[derive(Debug, Deserialize)]
struct NoticeListData {
    #[serde(default)]
    notices: Vec<Notice>,
}

#[derive(Debug, Deserialize)]
struct Notice {
    id: i64,
    title: String,
    #[serde(default)]
    listed_at: Option<String>,
    #[serde(default)]
    first_listed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NoticeDetailResponse {
    data: NoticeDetail,
}

#[derive(Debug, Deserialize)]
struct NoticeDetail {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    listed_at: Option<String>,
}

/// Upbit service-center notices in the `trade` category (Korean).
pub struct UpbitAdapter {
    fetcher: Fetcher,
    api_url: String,
    per_page: u32,
}

impl UpbitAdapter {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
            api_url: API_URL.to_string(),
            per_page: 20,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SiteAdapter for UpbitAdapter {
    fn exchange(&self) -> &str {
        "upbit"
    }

    async fn list(&self) -> Result<Vec<CrawlTarget>> {
        let url = format!(
            "{}/api/v1/announcements?os=web&page=1&per_page={}&category=trade",
            self.api_url, self.per_page
        );
        let response: NoticeListResponse = self.fetcher.get_json(&url).await?;
        if response.success == Some(false) {
            return Err(AggregatorError::Parse("Upbit notice list reported failure".to_string()));
        }

        info!("Upbit: {} trade notices", response.data.notices.len());
        Ok(response
            .data
            .notices
            .into_iter()
            .map(|notice| CrawlTarget {
                exchange: self.exchange().to_string(),
                key: notice.id.to_string(),
                title: notice.title,
                url: format!("{}?id={}", SITE_URL, notice.id),
                release_hint: notice
                    .first_listed_at
                    .or(notice.listed_at)
                    .as_deref()
                    .and_then(parse_timestamp),
                locator: notice.id.to_string(),
            })
            .collect())
    }

    async fn detail(&self, target: &CrawlTarget) -> Result<FetchedDetail> {
        let url = format!("{}/api/v1/announcements/{}", self.api_url, target.locator);
        let response: NoticeDetailResponse = self.fetcher.get_json(&url).await?;
        let detail = response.data;

        let body = detail.body.unwrap_or_default();
        let content = match detail.title {
            Some(title) if !title.is_empty() => format!("{}\n{}", title, body),
            _ => body,
        };

        Ok(FetchedDetail {
            content,
            format: ContentFormat::Html,
            release_time: detail.listed_at.as_deref().and_then(parse_timestamp),
        })
    }
}
