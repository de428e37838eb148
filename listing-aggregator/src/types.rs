use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub use interfaces::defs::{
    Action, AnnouncementMeta, AnnouncementRecord, ContentFormat, CrawlTarget, EffectiveDate, ExtractedEntry,
    ExtractionResult, FetchedDetail, MarketType, StoredArtifact, UNDETERMINED,
};

pub const DEFAULT_SPOT_EXCHANGES: &[&str] = &[
    "binance", "bingx", "bitget", "bybit", "gate", "mexc", "lbank", "upbit", "bithumb", "coinex",
];

/// Longest accepted freshness window.
pub const MAX_FRESHNESS_DAYS: i64 = 3650;

pub const DEFAULT_FUTURES_EXCHANGES: &[&str] = &[
    "binance", "bingx", "bitunix", "blofin", "bitget", "btcc", "bybit", "gate", "mexc", "okx", "lbank", "weex",
];

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Bounds of the randomized pause taken before every request.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            min_delay_ms: 500,
            max_delay_ms: 1500,
        }
    }
}

impl FetchConfig {
    /// No retries pause or politeness delay; used against local mock servers.
    pub fn immediate() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
            min_delay_ms: 0,
            max_delay_ms: 0,
            timeout_seconds: 5,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout_seconds: 60,
        }
    }
}

impl LlmConfig {
    /// Reads `OPENAI_API_KEY` (or `DEEPSEEK_API_KEY`), `LLM_BASE_URL` and `LLM_MODEL`.
    /// Returns `None` when no key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .or_else(|_| env::var("DEEPSEEK_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty())?;

        let mut config = Self {
            api_key,
            ..Default::default()
        };
        if let Ok(base_url) = env::var("LLM_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            config.model = model;
        }
        Some(config)
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_root: PathBuf,
    pub freshness_days: i64,
    /// Per-exchange cap on targets handled in one run.
    pub max_items_per_exchange: Option<usize>,
    /// Offset of the reporting timezone used for run dates (UTC+8).
    pub report_utc_offset_hours: i32,
    pub detail_timeout_seconds: u64,
    pub extraction_timeout_seconds: u64,
    pub max_prompt_chars: usize,
    pub min_item_delay_ms: u64,
    pub max_item_delay_ms: u64,
    pub exchanges: Vec<String>,
    pub spot_exchanges: Vec<String>,
    pub futures_exchanges: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            freshness_days: 7,
            max_items_per_exchange: None,
            report_utc_offset_hours: 8,
            detail_timeout_seconds: 90,
            extraction_timeout_seconds: 120,
            max_prompt_chars: 12_000,
            min_item_delay_ms: 1000,
            max_item_delay_ms: 3000,
            exchanges: crate::sources::EXCHANGES.iter().map(|s| s.to_string()).collect(),
            spot_exchanges: DEFAULT_SPOT_EXCHANGES.iter().map(|s| s.to_string()).collect(),
            futures_exchanges: DEFAULT_FUTURES_EXCHANGES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `OUTPUT_ROOT`, `FRESHNESS_DAYS`, `MAX_ITEMS` and `EXCHANGES`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(root) = env::var("OUTPUT_ROOT") {
            config.output_root = PathBuf::from(root);
        }
        if let Ok(days) = env::var("FRESHNESS_DAYS") {
            config.freshness_days = days
                .parse()
                .map_err(|_| AggregatorError::Config(format!("FRESHNESS_DAYS is not a number: {}", days)))?;
        }
        if let Ok(max) = env::var("MAX_ITEMS") {
            let max: usize = max
                .parse()
                .map_err(|_| AggregatorError::Config(format!("MAX_ITEMS is not a number: {}", max)))?;
            config.max_items_per_exchange = Some(max);
        }
        if let Ok(list) = env::var("EXCHANGES") {
            config.exchanges = parse_list(&list);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.freshness_days < 0 {
            return Err(AggregatorError::Config("freshness window must not be negative".to_string()));
        }
        if self.freshness_days > MAX_FRESHNESS_DAYS {
            return Err(AggregatorError::Config(format!(
                "freshness window of {} days exceeds {} days",
                self.freshness_days, MAX_FRESHNESS_DAYS
            )));
        }
        if !(-12..=14).contains(&self.report_utc_offset_hours) {
            return Err(AggregatorError::Config(format!(
                "reporting UTC offset out of range: {}",
                self.report_utc_offset_hours
            )));
        }
        if self.min_item_delay_ms > self.max_item_delay_ms {
            return Err(AggregatorError::Config("min item delay exceeds max item delay".to_string()));
        }
        Ok(())
    }

    pub fn report_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.report_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_seconds)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_seconds)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.output_root.join("artifacts")
    }
}

pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Timed out after {seconds}s: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Unknown exchange: {name}")]
    UnknownExchange { name: String },

    #[error("Artifact already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn freshness_window_is_bounded() {
        let at_limit = RunConfig {
            freshness_days: MAX_FRESHNESS_DAYS,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        for days in [-1, MAX_FRESHNESS_DAYS + 1, 1_000_000_000] {
            let config = RunConfig {
                freshness_days: days,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(AggregatorError::Config(_))), "{} days", days);
        }
    }
}
