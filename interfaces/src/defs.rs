use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Wire value used when an announcement does not state a usable date.
pub const UNDETERMINED: &str = "undetermined";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Listing,
    Delisting,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Listing => "listing",
            Action::Delisting => "delisting",
        }
    }

    /// Lenient parse of whatever wording a model or a site used.
    /// Delisting markers are checked first since several of them contain a listing marker.
    pub fn parse_loose(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }

        const DELISTING: &[&str] = &[
            "delist", "removal", "remove", "下架", "下线", "停止交易", "终止交易", "상장폐지", "거래지원 종료",
        ];
        const LISTING: &[&str] = &["list", "launch", "上架", "上线", "上市", "新增", "상장", "거래지원"];

        if DELISTING.iter().any(|m| lower.contains(m)) {
            Some(Action::Delisting)
        } else if LISTING.iter().any(|m| lower.contains(m)) {
            Some(Action::Listing)
        } else {
            None
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    #[default]
    Spot,
    Futures,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }

    pub fn parse_loose(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        const FUTURES: &[&str] = &["future", "perpetual", "perp", "swap", "contract", "合约", "永续", "期货", "선물"];
        const SPOT: &[&str] = &["spot", "现货", "현물"];

        if FUTURES.iter().any(|m| lower.contains(m)) {
            Some(MarketType::Futures)
        } else if SPOT.iter().any(|m| lower.contains(m)) {
            Some(MarketType::Spot)
        } else {
            None
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective date of a listing event. Serialized as `YYYY-MM-DD` or the
/// `undetermined` sentinel, never as null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum EffectiveDate {
    Date(NaiveDate),
    #[default]
    Undetermined,
}

impl EffectiveDate {
    /// Strict `YYYY-MM-DD` parse; anything else is undetermined.
    pub fn from_iso(value: &str) -> Self {
        let value = value.trim();
        if value.len() != 10 {
            return EffectiveDate::Undetermined;
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(EffectiveDate::Date)
            .unwrap_or(EffectiveDate::Undetermined)
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            EffectiveDate::Date(d) => Some(*d),
            EffectiveDate::Undetermined => None,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        matches!(self, EffectiveDate::Undetermined)
    }
}

impl fmt::Display for EffectiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveDate::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EffectiveDate::Undetermined => f.write_str(UNDETERMINED),
        }
    }
}

impl Serialize for EffectiveDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EffectiveDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.map(|s| EffectiveDate::from_iso(&s)).unwrap_or_default())
    }
}

/// One structured entry as produced by extraction: the four semantic fields only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntry {
    pub symbol: String,
    pub action: Action,
    #[serde(rename = "type")]
    pub market_type: MarketType,
    #[serde(rename = "time")]
    pub date: EffectiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub listings: Vec<ExtractedEntry>,
    pub delistings: Vec<ExtractedEntry>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty() && self.delistings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listings.len() + self.delistings.len()
    }

    /// Listings followed by delistings, each bound to the announcement it came from.
    pub fn into_records(self, meta: &AnnouncementMeta) -> Vec<AnnouncementRecord> {
        self.listings
            .into_iter()
            .chain(self.delistings)
            .map(|entry| AnnouncementRecord::from_entry(entry, meta))
            .collect()
    }
}

/// Discovery and provenance data shared by every record of one announcement.
/// Written on its own (with empty content) as the placeholder for stale targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementMeta {
    pub exchange: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub release_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    pub symbol: String,
    pub action: Action,
    #[serde(rename = "type")]
    pub market_type: MarketType,
    #[serde(rename = "time", default)]
    pub date: EffectiveDate,
    pub exchange: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub release_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    /// Path of the artifact this record was read from.
    #[serde(skip)]
    pub provenance: Option<String>,
}

impl AnnouncementRecord {
    pub fn from_entry(entry: ExtractedEntry, meta: &AnnouncementMeta) -> Self {
        Self {
            symbol: entry.symbol,
            action: entry.action,
            market_type: entry.market_type,
            date: entry.date,
            exchange: meta.exchange.clone(),
            title: meta.title.clone(),
            url: meta.url.clone(),
            release_time: meta.release_time,
            content: meta.content.clone(),
            provenance: None,
        }
    }
}

/// Durable per-target artifact. Both variants mark the target as processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredArtifact {
    Records(Vec<AnnouncementRecord>),
    Placeholder(AnnouncementMeta),
}

/// One announcement discovered by a site adapter's listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub exchange: String,
    /// Site-native article id, or a content hash of the canonical URL.
    pub key: String,
    pub title: String,
    pub url: String,
    pub release_hint: Option<DateTime<Utc>>,
    /// Adapter-private handle used to fetch the detail (article code, slug, ...).
    pub locator: String,
}

impl CrawlTarget {
    pub fn meta(&self, release_time: Option<DateTime<Utc>>, content: String) -> AnnouncementMeta {
        AnnouncementMeta {
            exchange: self.exchange.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            release_time: release_time.or(self.release_hint),
            content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentFormat {
    Html,
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDetail {
    pub content: String,
    pub format: ContentFormat,
    pub release_time: Option<DateTime<Utc>>,
}

impl FetchedDetail {
    pub fn html(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: ContentFormat::Html,
            release_time: None,
        }
    }

    pub fn with_release_time(mut self, release_time: Option<DateTime<Utc>>) -> Self {
        self.release_time = release_time;
        self
    }
}
