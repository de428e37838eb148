use crate::llm_adapter::{CompletionRequest, LlmAdapter};
use crate::types::{Action, EffectiveDate, ExtractedEntry, ExtractionResult, MarketType, UNDETERMINED};
use crate::utils::{text::truncate_chars, time::normalize_date};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SYSTEM_PROMPT: &str =
    "You are a professional cryptocurrency exchange announcement analyst. You only answer with JSON.";

const MAX_HEURISTIC_SYMBOLS: usize = 3;

lazy_static! {
    static ref LISTING_WORDS: Regex = Regex::new(r"(?i)\b(list|lists|listed|listing|will\s+launch)\b").unwrap();
    static ref DELISTING_WORDS: Regex = Regex::new(r"(?i)\b(delist|delists|delisted|delisting|removal)\b").unwrap();
    static ref FUTURES_WORDS: Regex = Regex::new(r"(?i)(futures|perpetual|合约|永续|선물)").unwrap();
    static ref PAIR: Regex = Regex::new(r"[A-Z0-9]{2,10}[/-][A-Z]{2,10}").unwrap();
}

const LISTING_PHRASES: &[&str] = &["上架", "上线", "新增", "开放交易", "开始交易", "신규 상장", "거래지원 안내", "원화 마켓 추가"];
const DELISTING_PHRASES: &[&str] = &["下架", "下线", "停止交易", "终止交易", "상장폐지", "거래지원 종료"];

/// Which degradation tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    /// The model answered with a well-formed JSON object.
    Structured,
    /// A JSON object was recovered from inside a noisy model answer.
    Salvaged,
    /// Keyword and pattern rules over the announcement text.
    Heuristic,
}

impl fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionTier::Structured => "structured",
            ExtractionTier::Salvaged => "salvaged",
            ExtractionTier::Heuristic => "heuristic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub result: ExtractionResult,
    pub tier: ExtractionTier,
}

/// Converts normalized announcement text into structured listing events.
///
/// The model is asked for strict JSON. A noisy answer is salvaged by scanning for the
/// first balanced JSON object, and a missing or unusable answer falls back to keyword
/// rules. Extraction itself never fails.
pub struct AnnouncementExtractor {
    llm: Option<Arc<dyn LlmAdapter>>,
    temperature: f32,
    max_tokens: u32,
    max_prompt_chars: usize,
    timeout: Duration,
}

impl AnnouncementExtractor {
    pub fn new(llm: Arc<dyn LlmAdapter>) -> Self {
        Self {
            llm: Some(llm),
            temperature: 0.1,
            max_tokens: 1000,
            max_prompt_chars: 12_000,
            timeout: Duration::from_secs(120),
        }
    }

    /// Extractor without a model; every call uses the keyword rules.
    pub fn heuristic_only() -> Self {
        Self {
            llm: None,
            temperature: 0.1,
            max_tokens: 1000,
            max_prompt_chars: 12_000,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_model(&self) -> bool {
        self.llm.is_some()
    }

    pub fn build_prompt(&self, text: &str) -> String {
        let body = truncate_chars(text, self.max_prompt_chars);
        format!(
            r#"Analyze the following cryptocurrency exchange announcement and extract every token listing and delisting it announces.
The announcement may be written in Chinese, English or Korean.

Return a JSON object with exactly this shape:
{{
  "listings": [{{"symbol": "BTC/USDT", "action": "listing", "type": "spot", "time": "2024-01-15"}}],
  "delistings": [{{"symbol": "ETH/USDT", "action": "delisting", "type": "futures", "time": "2024-01-15"}}]
}}

Rules:
1. Only include tokens that are explicitly being listed or delisted.
2. "time" is the effective date formatted as YYYY-MM-DD with no other characters. Use "{sentinel}" when no date is stated.
3. "symbol" is the trading pair, for example BTC/USDT.
4. "type" must be "spot" or "futures". Use "spot" when the market is not stated.
5. Use empty arrays when the announcement lists or delists nothing.
6. Answer with the JSON object only, without explanations.

Announcement:
{body}"#,
            sentinel = UNDETERMINED,
            body = body
        )
    }

    pub async fn extract(&self, text: &str) -> ExtractionResult {
        self.extract_detailed(text).await.result
    }

    pub async fn extract_detailed(&self, text: &str) -> Extraction {
        let extraction = self.run_tiers(text).await;
        info!(
            "Extraction finished via {} tier: {} listings, {} delistings",
            extraction.tier,
            extraction.result.listings.len(),
            extraction.result.delistings.len()
        );
        extraction
    }

    async fn run_tiers(&self, text: &str) -> Extraction {
        let Some(llm) = &self.llm else {
            return heuristic(text);
        };

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: self.build_prompt(text),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = match tokio::time::timeout(self.timeout, llm.complete(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("LLM call via {} failed, using keyword rules: {}", llm.adapter_name(), e);
                return heuristic(text);
            }
            Err(_) => {
                warn!("LLM call via {} timed out after {:?}, using keyword rules", llm.adapter_name(), self.timeout);
                return heuristic(text);
            }
        };

        match parse_response(&response) {
            Some(extraction) => extraction,
            None => {
                debug!("LLM answer held no usable JSON: {}", truncate_chars(&response, 200));
                heuristic(text)
            }
        }
    }
}

fn heuristic(text: &str) -> Extraction {
    Extraction {
        result: heuristic_extract(text),
        tier: ExtractionTier::Heuristic,
    }
}

/// Tiers one and two: strict parse, then balanced-object salvage.
pub fn parse_response(response: &str) -> Option<Extraction> {
    let stripped = strip_code_fence(response);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(stripped) {
        return Some(Extraction {
            result: validate(&value),
            tier: ExtractionTier::Structured,
        });
    }

    salvage_json_object(response).map(|value| Extraction {
        result: validate(&value),
        tier: ExtractionTier::Salvaged,
    })
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// First balanced `{...}` in `raw` that parses as a JSON object. Braces inside strings are ignored.
pub fn salvage_json_object(raw: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = raw[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (idx, ch) in raw[start..].char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &raw[start..start + idx + 1];
                        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }

        search_from = start + 1;
    }
    None
}

/// Fills defaults and drops entries without a usable symbol.
pub fn validate(value: &Value) -> ExtractionResult {
    ExtractionResult {
        listings: validate_section(value.get("listings"), Action::Listing),
        delistings: validate_section(value.get("delistings"), Action::Delisting),
    }
}

fn validate_section(section: Option<&Value>, default_action: Action) -> Vec<ExtractedEntry> {
    let Some(items) = section.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let symbol = normalize_symbol(obj.get("symbol")?.as_str()?);
            if symbol.is_empty() {
                return None;
            }

            let action = obj
                .get("action")
                .and_then(Value::as_str)
                .and_then(Action::parse_loose)
                .unwrap_or(default_action);
            let market_type = obj
                .get("type")
                .and_then(Value::as_str)
                .and_then(MarketType::parse_loose)
                .unwrap_or_default();
            let date = obj
                .get("time")
                .and_then(Value::as_str)
                .map(normalize_date)
                .unwrap_or(EffectiveDate::Undetermined);

            Some(ExtractedEntry {
                symbol,
                action,
                market_type,
                date,
            })
        })
        .collect()
}

fn normalize_symbol(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}

/// Tier three: keyword, pair and date rules. Emits one entry per detected pair
/// for each matched direction.
pub fn heuristic_extract(text: &str) -> ExtractionResult {
    let is_listing = LISTING_WORDS.is_match(text) || LISTING_PHRASES.iter().any(|p| text.contains(p));
    let is_delisting = DELISTING_WORDS.is_match(text) || DELISTING_PHRASES.iter().any(|p| text.contains(p));

    let mut result = ExtractionResult::default();
    if !is_listing && !is_delisting {
        return result;
    }

    let upper = text.to_uppercase();
    let mut symbols: Vec<String> = Vec::new();
    for m in PAIR.find_iter(&upper) {
        let symbol = m.as_str().to_string();
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
        if symbols.len() == MAX_HEURISTIC_SYMBOLS {
            break;
        }
    }

    let date = normalize_date(text);
    let market_type = if FUTURES_WORDS.is_match(text) {
        MarketType::Futures
    } else {
        MarketType::Spot
    };

    let entries = |action: Action| -> Vec<ExtractedEntry> {
        symbols
            .iter()
            .map(|symbol| ExtractedEntry {
                symbol: symbol.clone(),
                action,
                market_type,
                date,
            })
            .collect()
    };

    if is_listing {
        result.listings = entries(Action::Listing);
    }
    if is_delisting {
        result.delistings = entries(Action::Delisting);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> EffectiveDate {
        EffectiveDate::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn strict_json_with_code_fence() {
        let raw = "```json\n{\"listings\": [{\"symbol\": \"foo/usdt\", \"action\": \"listing\", \"type\": \"spot\", \"time\": \"2025-08-08\"}], \"delistings\": []}\n```";
        let extraction = parse_response(raw).unwrap();
        assert_eq!(extraction.tier, ExtractionTier::Structured);
        assert_eq!(extraction.result.listings[0].symbol, "FOO/USDT");
        assert_eq!(extraction.result.listings[0].date, date(2025, 8, 8));
    }

    #[test]
    fn salvages_object_between_prose() {
        let raw = r#"Sure! Here you go: {"listings": [], "delistings": []} Let me know {if} you need more."#;
        let extraction = parse_response(raw).unwrap();
        assert_eq!(extraction.tier, ExtractionTier::Salvaged);
        assert!(extraction.result.is_empty());
    }

    #[test]
    fn salvage_ignores_braces_inside_strings() {
        let raw = r#"note {"listings": [{"symbol": "A}B/USDT"}], "delistings": []} tail"#;
        let value = salvage_json_object(raw).unwrap();
        assert_eq!(value["listings"][0]["symbol"], "A}B/USDT");
    }

    #[test]
    fn no_json_yields_none() {
        assert!(parse_response("I could not find any listings.").is_none());
    }

    #[test]
    fn validation_fills_defaults_and_drops_blank_symbols() {
        let value: Value = serde_json::from_str(
            r#"{"listings": [{"symbol": "ABC/USDT"}, {"symbol": "  "}, "junk", {"action": "listing"}],
                "delistings": [{"symbol": "xyz/usdt", "type": "永续合约", "time": "2025年7月6日", "action": "???"}]}"#,
        )
        .unwrap();
        let result = validate(&value);

        assert_eq!(result.listings.len(), 1);
        let listing = &result.listings[0];
        assert_eq!(listing.action, Action::Listing);
        assert_eq!(listing.market_type, MarketType::Spot);
        assert_eq!(listing.date, EffectiveDate::Undetermined);

        let delisting = &result.delistings[0];
        assert_eq!(delisting.symbol, "XYZ/USDT");
        assert_eq!(delisting.action, Action::Delisting);
        assert_eq!(delisting.market_type, MarketType::Futures);
        assert_eq!(delisting.date, date(2025, 7, 6));
    }

    #[test]
    fn heuristic_reads_english_listing() {
        let result = heuristic_extract("Exchange X will list FOO/USDT. Trading starts 2025-08-08.");
        assert_eq!(result.listings.len(), 1);
        assert!(result.delistings.is_empty());
        assert_eq!(result.listings[0].symbol, "FOO/USDT");
        assert_eq!(result.listings[0].market_type, MarketType::Spot);
        assert_eq!(result.listings[0].date, date(2025, 8, 8));
    }

    #[test]
    fn heuristic_does_not_read_delisting_as_listing() {
        let result = heuristic_extract("Binance will delist BAR/USDT perpetual contracts on 2025-08-10");
        assert!(result.listings.is_empty());
        assert_eq!(result.delistings.len(), 1);
        assert_eq!(result.delistings[0].market_type, MarketType::Futures);
    }

    #[test]
    fn heuristic_handles_chinese_text_and_caps_symbols() {
        let text = "关于上架 AAA/USDT、BBB/USDT、CCC/USDT、DDD/USDT 现货交易的公告 2025年8月1日";
        let result = heuristic_extract(text);
        assert_eq!(result.listings.len(), 3);
        assert_eq!(result.listings[2].symbol, "CCC/USDT");
        assert_eq!(result.listings[0].date, date(2025, 8, 1));
    }

    #[test]
    fn heuristic_without_keywords_is_empty() {
        assert!(heuristic_extract("System maintenance for BTC/USDT wallet").is_empty());
    }

    #[tokio::test]
    async fn slow_model_falls_back_to_keywords() {
        let llm = Arc::new(crate::llm_adapter::MockLlmAdapter::new("slow").with_delay(5_000));
        let extractor = AnnouncementExtractor::new(llm.clone()).with_timeout(Duration::from_millis(100));
        assert!(extractor.has_model());

        let started = std::time::Instant::now();
        let extraction = extractor.extract_detailed("Binance will list FOO/USDT on 2025-08-08").await;

        assert_eq!(extraction.tier, ExtractionTier::Heuristic);
        assert_eq!(extraction.result.listings.len(), 1);
        assert_eq!(extraction.result.listings[0].symbol, "FOO/USDT");
        assert_eq!(llm.call_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn without_model_uses_keywords() {
        let extractor = AnnouncementExtractor::heuristic_only();
        assert!(!extractor.has_model());
        let extraction = extractor.extract_detailed("OKX will delist BAR/USDT").await;
        assert_eq!(extraction.tier, ExtractionTier::Heuristic);
        assert_eq!(extraction.result.delistings.len(), 1);
    }

    #[test]
    fn prompt_is_truncated() {
        let extractor = AnnouncementExtractor::heuristic_only().with_max_prompt_chars(5);
        let prompt = extractor.build_prompt("ABCDEFGHIJ");
        assert!(prompt.ends_with("ABCDE"));
    }
}
