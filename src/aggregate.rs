//! # Aggregation
//! Top-level queries: fan out to every provider concurrently, merge, score,
//! and serve through the stale-tolerant cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::MemoryCache;
use crate::digest::{generate_digest, Digest, DIGEST_CATEGORIES};
use crate::error::NewsError;
use crate::fallback::{CacheFallback, CacheState};
use crate::ingest::client::ProviderClient;
use crate::ingest::ensure_metrics_described;
use crate::ingest::merge::merge_and_score;
use crate::ingest::types::{Article, Category, Language};
use crate::sentiment::{SentimentAnalyzer, SentimentLabel};

pub const SEARCH_RESULT_CAP: usize = 20;
pub use crate::fallback::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub articles: Vec<Article>,
    /// Providers that answered successfully, in call order.
    pub sources_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub served_from_cache: bool,
    pub staleness_note: Option<String>,
}

/// How the source filter compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMatch {
    #[default]
    Exact,
    Contains,
}

/// Optional post-cache narrowing by source name and sentiment label.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub source: Option<String>,
    pub sentiment: Option<SentimentLabel>,
    pub source_match: SourceMatch,
}

impl ArticleFilter {
    pub fn matches(&self, a: &Article) -> bool {
        let source_ok = match self.source.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(want) => {
                let have = a.source_name.to_lowercase();
                let want = want.to_lowercase();
                match self.source_match {
                    SourceMatch::Exact => have == want,
                    SourceMatch::Contains => have.contains(&want),
                }
            }
        };
        source_ok && self.sentiment.map_or(true, |s| a.sentiment.label == s)
    }

    pub fn apply(&self, articles: &[Article]) -> Vec<Article> {
        articles.iter().filter(|a| self.matches(a)).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Upstream<'q> {
    Headlines(Category),
    Search(&'q str),
}

pub fn news_cache_key(category: Category, language: Language) -> String {
    format!("news_{category}_{language}")
}

pub fn search_cache_key(query: &str, language: Language) -> String {
    format!("search_{}_{language}", query.to_lowercase())
}

pub struct Aggregator {
    providers: Vec<ProviderClient>,
    cache: CacheFallback<AggregationResult>,
    analyzer: SentimentAnalyzer,
}

impl Aggregator {
    pub fn new(providers: Vec<ProviderClient>, cache: CacheFallback<AggregationResult>) -> Self {
        ensure_metrics_described();
        Self {
            providers,
            cache,
            analyzer: SentimentAnalyzer::new(),
        }
    }

    /// In-memory cache with the given TTL.
    pub fn with_memory_cache(providers: Vec<ProviderClient>, ttl: Duration) -> Self {
        Self::new(
            providers,
            CacheFallback::new(Arc::new(MemoryCache::new()), ttl),
        )
    }

    /// Upper bound on one query, including time spent waiting on a
    /// concurrent fetch of the same key.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.cache = self.cache.with_timeout(timeout);
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn cache_state(&self, category: Category, language: Language) -> CacheState {
        self.cache.state(&news_cache_key(category, language))
    }

    pub fn evict(&self, category: Category, language: Language) -> bool {
        self.cache.evict(&news_cache_key(category, language))
    }

    /// Queries currently waiting on upstream providers.
    pub fn in_flight(&self) -> usize {
        self.cache.in_flight()
    }

    /// Headlines for one category/language.
    pub async fn aggregate(
        &self,
        category: Category,
        language: Language,
    ) -> Result<AggregationResult, NewsError> {
        let key = news_cache_key(category, language);
        let served = self
            .cache
            .get_or_fetch(&key, || self.fetch_merged(Upstream::Headlines(category), language))
            .await?;

        let mut result = served.value;
        result.served_from_cache = served.served_from_cache;
        result.staleness_note = served.staleness;
        Ok(result)
    }

    /// Free-text search across providers; at most [`SEARCH_RESULT_CAP`] results.
    pub async fn search(
        &self,
        query: &str,
        language: Language,
        filter: &ArticleFilter,
    ) -> Result<Vec<Article>, NewsError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NewsError::InvalidInput(
                "Search query is required".to_string(),
            ));
        }

        let key = search_cache_key(query, language);
        info!(query_id = %anon_hash(query), %language, "search");
        let served = self
            .cache
            .get_or_fetch(&key, || self.fetch_merged(Upstream::Search(query), language))
            .await?;

        let mut out = filter.apply(&served.value.articles);
        out.truncate(SEARCH_RESULT_CAP);
        Ok(out)
    }

    /// Top stories for each digest category. A failing category yields an
    /// empty list instead of failing the digest.
    pub async fn digest(&self, language: Language) -> Digest {
        let results = join_all(
            DIGEST_CATEGORIES
                .iter()
                .map(|&c| async move { (c, self.aggregate(c, language).await) }),
        )
        .await;

        let mut digest = Digest::new();
        for (category, res) in results {
            let items = match res {
                Ok(r) => generate_digest(&r.articles, category),
                Err(e) => {
                    warn!(%category, error = %e, "digest category unavailable");
                    Vec::new()
                }
            };
            digest.sections.insert(category, items);
        }
        digest
    }

    /// Call every provider concurrently, keep the successes, merge.
    /// Fails only when every provider failed.
    async fn fetch_merged(
        &self,
        upstream: Upstream<'_>,
        language: Language,
    ) -> Result<AggregationResult, NewsError> {
        let t0 = Instant::now();
        let outcomes = join_all(self.providers.iter().map(|p| async move {
            let res = match upstream {
                Upstream::Headlines(category) => p.fetch_headlines(category, language).await,
                Upstream::Search(query) => p.fetch_search(query, language).await,
            };
            (p.name(), res)
        }))
        .await;
        histogram!("news_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let mut batches = Vec::with_capacity(outcomes.len());
        let mut sources_used = Vec::new();
        let mut failures = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(batch) => {
                    info!(provider = name, count = batch.len(), "provider ok");
                    sources_used.push(name.to_string());
                    batches.push(batch);
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "provider failed; continuing without it");
                    failures.push(e);
                }
            }
        }

        if sources_used.is_empty() {
            return Err(NewsError::AllProvidersFailed(failures));
        }

        let articles = merge_and_score(batches, &self.analyzer, language);
        Ok(AggregationResult {
            articles,
            sources_used,
            timestamp: Utc::now(),
            served_from_cache: false,
            staleness_note: None,
        })
    }
}

/// Short stable id for free text, so queries can be logged without the text.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest as _, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::Sentiment;

    fn article(title: &str, source: &str, label_score: f64) -> Article {
        Article {
            title: title.into(),
            description: None,
            url: "https://example.test".into(),
            image_url: None,
            source_name: source.into(),
            published_at: DateTime::<Utc>::UNIX_EPOCH,
            sentiment: Sentiment::from_score(label_score),
            language: Language::En,
        }
    }

    #[test]
    fn cache_keys_follow_category_and_language() {
        assert_eq!(
            news_cache_key(Category::Technology, Language::En),
            "news_technology_en"
        );
        assert_eq!(search_cache_key("Rust", Language::Hi), "search_rust_hi");
    }

    #[test]
    fn filter_exact_vs_contains() {
        let items = vec![
            article("a", "BBC News", 0.0),
            article("b", "BBC", 0.9),
            article("c", "Reuters", -0.9),
        ];
        let exact = ArticleFilter {
            source: Some("bbc".into()),
            ..Default::default()
        };
        assert_eq!(exact.apply(&items).len(), 1);

        let contains = ArticleFilter {
            source: Some("bbc".into()),
            source_match: SourceMatch::Contains,
            ..Default::default()
        };
        assert_eq!(contains.apply(&items).len(), 2);

        let by_label = ArticleFilter {
            sentiment: Some(SentimentLabel::VeryNegative),
            ..Default::default()
        };
        let out = by_label.apply(&items);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "c");
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        assert_eq!(anon_hash("rust"), anon_hash("rust"));
        assert_eq!(anon_hash("rust").len(), 12);
        assert_ne!(anon_hash("rust"), anon_hash("go"));
    }
}
