use crate::fetcher::Fetcher;
use crate::traits::SiteAdapter;
use crate::types::{AggregatorError, ContentFormat, CrawlTarget, FetchConfig, FetchedDetail, Result};
use crate::utils::time::parse_timestamp;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const BASE_URL: &str = "https://www.okx.com";
const SECTIONS: &[&str] = &["announcements-new-listings", "announcements-delistings"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleItem {
    id: Value,
    slug: String,
    title: String,
    #[serde(default)]
    publish_time: Option<Value>,
}

/// OKX help-center sections. Article lists are embedded in the server-rendered page state.
pub struct OkxAdapter {
    fetcher: Fetcher,
    base_url: String,
}

impl OkxAdapter {
    pub fn new(config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config)?,
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn list_section(&self, section: &str) -> Result<Vec<CrawlTarget>> {
        let url = format!("{}/help/section/{}", self.base_url, section);
        let html = self.fetcher.get_text(&url).await?;
        let items = section_items(&html)
            .ok_or_else(|| AggregatorError::Parse(format!("no article list in OKX section {}", section)))?;

        Ok(items
            .into_iter()
            .map(|item| {
                let id = match &item.id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                CrawlTarget {
                    exchange: self.exchange().to_string(),
                    key: id,
                    url: format!("{}/help/{}", self.base_url, item.slug),
                    title: item.title,
                    release_hint: item.publish_time.as_ref().and_then(value_timestamp),
                    locator: item.slug,
                }
            })
            .collect())
    }
}

#[async_trait]
impl SiteAdapter for OkxAdapter {
    fn exchange(&self) -> &str {
        "okx"
    }

    async fn list(&self) -> Result<Vec<CrawlTarget>> {
        let mut targets = Vec::new();
        for section in SECTIONS {
            match self.list_section(section).await {
                Ok(found) => {
                    info!("OKX section {}: {} announcements", section, found.len());
                    targets.extend(found);
                }
                Err(e) => warn!("Failed to list OKX section {}: {}", section, e),
            }
        }
        if targets.is_empty() {
            return Err(AggregatorError::General("OKX sections returned nothing".to_string()));
        }
        Ok(targets)
    }

    async fn detail(&self, target: &CrawlTarget) -> Result<FetchedDetail> {
        let html = self.fetcher.get_text(&target.url).await?;
        Ok(FetchedDetail {
            content: article_html(&html).unwrap_or(html),
            format: ContentFormat::Html,
            release_time: None,
        })
    }
}

fn section_items(html: &str) -> Option<Vec<ArticleItem>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[data-id="__app_data_for_ssr__"]"#).ok()?;
    let raw: String = document.select(&selector).next()?.text().collect();
    let data: Value = serde_json::from_str(raw.trim()).ok()?;
    let items = data.pointer("/appContext/initialProps/sectionData/articleList/items")?;
    serde_json::from_value(items.clone()).ok()
}

/// Outer HTML of the page's `<article>` element.
fn article_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("article").ok()?;
    document.select(&selector).next().map(|article| article.html())
}

fn value_timestamp(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| parse_timestamp(&n.to_string())),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_embedded_section_state() {
        let html = r#"<html><body>
            <script data-id="__app_data_for_ssr__" type="application/json">
            {"appContext":{"initialProps":{"sectionData":{"articleList":{"items":[
                {"id": 101, "slug": "okx-to-list-foo", "title": "OKX to list FOO", "publishTime": "2025-08-07T10:00:00.000Z"}
            ]}}}}}
            </script></body></html>"#;
        let items = section_items(html).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].slug, "okx-to-list-foo");
        assert!(items[0].publish_time.as_ref().and_then(value_timestamp).is_some());
    }

    #[test]
    fn extracts_article_element() {
        let html = "<html><body><nav>x</nav><article><p>Delist BAR</p></article></body></html>";
        assert_eq!(article_html(html).unwrap(), "<article><p>Delist BAR</p></article>");
    }
}
