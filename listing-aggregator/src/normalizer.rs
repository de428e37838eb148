use crate::types::{ContentFormat, FetchedDetail};
use crate::utils::text::collapse_whitespace;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex = Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").unwrap();
    static ref BLOCK_TAG: Regex = Regex::new(r"(?i)</?(p|div|br|li|tr|h[1-6]|section|article|table)[^>]*>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "head", "svg", "iframe", "template",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "td", "th", "table", "section", "article", "blockquote", "pre", "h1", "h2",
    "h3", "h4", "h5", "h6",
];

/// JSON keys whose string values are structure, not announcement text.
const STRUCTURAL_KEYS: &[&str] = &[
    "node", "tag", "type", "attr", "attrs", "style", "class", "id", "href", "src", "url", "uuid", "code", "locale",
    "slug", "key",
];

/// Turns raw HTML or JSON announcement bodies into plain text.
///
/// Never fails: when structured parsing produces nothing, a regex tag strip is used instead.
#[derive(Debug, Default, Clone)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, detail: &FetchedDetail) -> String {
        match detail.format {
            ContentFormat::Json => self.normalize_json(&detail.content),
            ContentFormat::Html => self.normalize_html(&detail.content),
            ContentFormat::Text => tidy(&detail.content),
        }
    }

    pub fn normalize_html(&self, raw: &str) -> String {
        if !raw.contains('<') {
            return tidy(raw);
        }

        let document = Html::parse_document(raw);
        let mut out = String::new();
        walk(document.root_element(), &mut out);

        let text = tidy(&out);
        if text.is_empty() {
            strip_tags(raw)
        } else {
            text
        }
    }

    /// String leaves in document order; HTML found inside a leaf is normalized too.
    pub fn normalize_json(&self, raw: &str) -> String {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return self.normalize_html(raw),
        };

        let mut leaves = Vec::new();
        collect_strings(&value, &mut leaves);

        let parts: Vec<String> = leaves
            .into_iter()
            .map(|leaf| {
                if leaf.contains('<') && leaf.contains('>') {
                    self.normalize_html(leaf)
                } else if looks_like_json(leaf) {
                    self.normalize_json(leaf)
                } else {
                    tidy(leaf)
                }
            })
            .filter(|s| !s.is_empty())
            .collect();

        parts.join("\n")
    }
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push('\n');
            }
            walk(child_element, out);
            if block {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => {
            for (key, v) in map {
                if STRUCTURAL_KEYS.contains(&key.as_str()) && v.is_string() {
                    continue;
                }
                collect_strings(v, out);
            }
        }
        _ => {}
    }
}

fn looks_like_json(s: &str) -> bool {
    let t = s.trim();
    (t.starts_with('{') && t.ends_with('}')) || (t.starts_with('[') && t.ends_with(']'))
}

fn strip_tags(raw: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(raw, " ");
    let with_breaks = BLOCK_TAG.replace_all(&without_scripts, "\n");
    let text = ANY_TAG.replace_all(&with_breaks, " ");
    tidy(&decode_basic_entities(&text))
}

fn decode_basic_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapse whitespace per line and drop blank lines.
fn tidy(text: &str) -> String {
    text.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_scripts_and_chrome() {
        let html = r#"<html><head><title>t</title><script>var x = 1;</script></head>
            <body><nav>Menu</nav><header>Top</header>
            <p>Binance will list   FOO/USDT.</p><p>Trading starts 2025-08-08.</p>
            <footer>Footer</footer></body></html>"#;
        let text = ContentNormalizer::new().normalize_html(html);
        assert_eq!(text, "Binance will list FOO/USDT.\nTrading starts 2025-08-08.");
    }

    #[test]
    fn inline_elements_stay_on_one_line() {
        let text = ContentNormalizer::new().normalize_html("<p>Will list <b>FOO</b>/USDT</p>");
        assert_eq!(text, "Will list FOO/USDT");
    }

    #[test]
    fn plain_text_passes_through() {
        let text = ContentNormalizer::new().normalize_html("  上架   ABC/USDT \n\n 现货 ");
        assert_eq!(text, "上架 ABC/USDT\n现货");
    }

    #[test]
    fn json_bodies_keep_text_leaves_in_order() {
        let raw = r#"{"node":"root","child":[
            {"node":"element","tag":"p","child":[{"node":"text","text":"Binance will list FOO"}]},
            {"node":"element","tag":"p","child":[{"node":"text","text":"Trading starts 2025-08-08"}]}
        ]}"#;
        let detail = FetchedDetail {
            content: raw.to_string(),
            format: ContentFormat::Json,
            release_time: None,
        };
        let text = ContentNormalizer::new().normalize(&detail);
        assert_eq!(text, "Binance will list FOO\nTrading starts 2025-08-08");
    }

    #[test]
    fn object_fields_keep_document_order() {
        let text = ContentNormalizer::new().normalize_json(r#"{"title":"Z first line","body":"A second line"}"#);
        assert_eq!(text, "Z first line\nA second line");

        let detail = FetchedDetail {
            content: r#"{"title":"Delisting of BAR/USDT","description":"Effective 2025-08-01","date":"2025-07-20","content":"<p>Trading ends</p>"}"#.to_string(),
            format: ContentFormat::Json,
            release_time: None,
        };
        let text = ContentNormalizer::new().normalize(&detail);
        assert!(text.starts_with("Delisting of BAR/USDT\nEffective 2025-08-01"));
    }

    #[test]
    fn tag_strip_handles_broken_markup() {
        let text = strip_tags("<div><script>x()</script>Delist &amp; remove<br>BAR/USDT");
        assert_eq!(text, "Delist & remove\nBAR/USDT");
    }
}
