// src/ingest/mod.rs
pub mod client;
pub mod merge;
pub mod providers;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::ingest::types::UNKNOWN_SOURCE;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "news_provider_articles_total",
            "Articles parsed from provider payloads."
        );
        describe_counter!(
            "news_provider_errors_total",
            "Provider calls that failed after all retries."
        );
        describe_counter!(
            "news_provider_retries_total",
            "Provider attempts retried after throttling."
        );
        describe_counter!("news_cache_hits_total", "Fresh cache hits.");
        describe_counter!("news_cache_misses_total", "Cache misses that triggered a fetch.");
        describe_counter!(
            "news_cache_stale_served_total",
            "Stale entries served after a failed refresh."
        );
        describe_counter!(
            "news_merge_duplicates_total",
            "Articles dropped by title deduplication."
        );
        describe_histogram!("news_fetch_ms", "Provider fan-out time in milliseconds.");
    });
}

/// Clean provider text: decode entities, strip tags, straighten quotes,
/// collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Some(re_tags) = RE_TAGS
        .get_or_try_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>"))
        .ok()
    {
        out = re_tags.replace_all(&out, "").to_string();
    }

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Optional text field: normalized, `None` when nothing is left.
pub fn normalize_opt(s: Option<&str>) -> Option<String> {
    s.map(normalize_text).filter(|t| !t.is_empty())
}

/// Keep only absolute http(s) image URLs.
pub fn normalize_image_url(url: Option<&str>) -> Option<String> {
    url.map(str::trim)
        .filter(|u| u.starts_with("http"))
        .map(str::to_string)
}

pub fn source_name_or_default(name: Option<&str>) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

/// RFC 3339 timestamp; unparseable or missing values fall back to the epoch.
pub fn parse_published_at(ts: Option<&str>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
