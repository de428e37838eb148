/// Text processing utilities
pub mod text {
    /// Cut `text` to at most `max_chars` characters on a char boundary.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    /// Collapse runs of whitespace inside a line to single spaces.
    pub fn collapse_whitespace(line: &str) -> String {
        line.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Stable identifiers for announcements and artifact files
pub mod hash {
    use sha2::{Digest, Sha256};

    const MAX_KEY_LEN: usize = 96;

    pub fn sha256_hex(input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// Keys become file names, so anything outside `[A-Za-z0-9_-]` is replaced by its digest.
    pub fn sanitize_key(key: &str) -> String {
        let key = key.trim();
        let safe = !key.is_empty()
            && key.len() <= MAX_KEY_LEN
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if safe {
            key.to_string()
        } else {
            sha256_hex(key)
        }
    }
}

/// Date and freshness helpers
pub mod time {
    use crate::types::EffectiveDate;
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
    use lazy_static::lazy_static;
    use regex::{Captures, Regex};

    lazy_static! {
        static ref CJK_DATE: Regex =
            Regex::new(r"(\d{4})\s*[年년]\s*(\d{1,2})\s*[月월]\s*(\d{1,2})\s*[日일]?").unwrap();
        static ref NUMERIC_DATE: Regex = Regex::new(r"(?:^|\D)(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:\D|$)").unwrap();
        static ref DAY_MONTH_YEAR: Regex = Regex::new(
            r"(?i)(?:^|\D)(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})"
        )
        .unwrap();
        static ref MONTH_DAY_YEAR: Regex = Regex::new(
            r"(?i)(?:^|[^a-z])(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})"
        )
        .unwrap();
    }

    /// Normalizes the first valid date found in `raw` to an ISO date.
    ///
    /// Accepts `2025年7月6日`, `2025년 7월 6일`, `2025-7-6`, `2025/07/06`, `2025.07.06`,
    /// `6 July 2025` and `July 6, 2025`. Trailing clock times are ignored. Anything
    /// else, or a date that does not exist on the calendar, is undetermined.
    pub fn normalize_date(raw: &str) -> EffectiveDate {
        [
            earliest(&CJK_DATE, raw, |c| ymd(c, 1, 2, 3)),
            earliest(&NUMERIC_DATE, raw, |c| ymd(c, 1, 2, 3)),
            earliest(&DAY_MONTH_YEAR, raw, |c| dmy_named(c, 1, 2, 3)),
            earliest(&MONTH_DAY_YEAR, raw, |c| dmy_named(c, 2, 1, 3)),
        ]
        .into_iter()
        .flatten()
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, date)| EffectiveDate::Date(date))
        .unwrap_or(EffectiveDate::Undetermined)
    }

    /// First match of `re` that forms a real calendar date, with its offset.
    fn earliest(re: &Regex, raw: &str, to_date: impl Fn(&Captures) -> Option<NaiveDate>) -> Option<(usize, NaiveDate)> {
        re.captures_iter(raw).find_map(|c| to_date(&c).map(|date| (start(&c), date)))
    }

    fn start(caps: &Captures) -> usize {
        caps.get(0).map(|m| m.start()).unwrap_or(usize::MAX)
    }

    fn num(caps: &Captures, idx: usize) -> Option<u32> {
        caps.get(idx)?.as_str().parse().ok()
    }

    fn ymd(caps: &Captures, y: usize, m: usize, d: usize) -> Option<NaiveDate> {
        let year = num(caps, y)? as i32;
        if !(2000..=2100).contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, num(caps, m)?, num(caps, d)?)
    }

    fn dmy_named(caps: &Captures, day: usize, month: usize, year: usize) -> Option<NaiveDate> {
        let month = month_number(caps.get(month)?.as_str())?;
        let year = num(caps, year)? as i32;
        if !(2000..=2100).contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, num(caps, day)?)
    }

    fn month_number(name: &str) -> Option<u32> {
        let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
        let month = match prefix.as_str() {
            "jan" => 1,
            "feb" => 2,
            "mar" => 3,
            "apr" => 4,
            "may" => 5,
            "jun" => 6,
            "jul" => 7,
            "aug" => 8,
            "sep" => 9,
            "oct" => 10,
            "nov" => 11,
            "dec" => 12,
            _ => return None,
        };
        Some(month)
    }

    /// Calendar date of `now` in the reporting timezone.
    pub fn run_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
        now.with_timezone(&offset).date_naive()
    }

    /// Start of the trailing window; saturates at the earliest representable instant.
    pub fn freshness_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        Duration::try_days(days)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First calendar date inside a window of `days` ending on `run_date`.
    pub fn date_floor(run_date: NaiveDate, days: i64) -> NaiveDate {
        Duration::try_days(days)
            .and_then(|window| run_date.checked_sub_signed(window))
            .unwrap_or(NaiveDate::MIN)
    }

    /// A release time older than the trailing window is stale. Unknown release times are not.
    pub fn is_stale(release: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> bool {
        release.is_some_and(|r| r < freshness_cutoff(now, days))
    }

    pub fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(ms)
    }

    /// Accepts RFC 3339 strings and bare epoch values (seconds or milliseconds).
    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        let n: i64 = raw.parse().ok()?;
        if n > 100_000_000_000 {
            from_epoch_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        }
    }
}
