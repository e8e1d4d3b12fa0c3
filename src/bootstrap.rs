// src/bootstrap.rs
//! Wire providers, limiters and cache from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::aggregate::{AggregationResult, Aggregator};
use crate::cache::MemoryCache;
use crate::config::{AppConfig, LimitConfig};
use crate::fallback::CacheFallback;
use crate::ingest::client::ProviderClient;
use crate::ingest::providers::build_http_client;
use crate::ingest::providers::gnews::GNewsSource;
use crate::ingest::providers::newsapi::NewsApiSource;
use crate::ingest::types::NewsSource;
use crate::rate_limit::RateLimiter;

fn limiter(name: &str, l: LimitConfig) -> RateLimiter {
    RateLimiter::new(name, l.max_requests, Duration::from_secs(l.window_secs))
}

fn client(source: Arc<dyn NewsSource>, l: LimitConfig) -> ProviderClient {
    let lim = limiter(source.name(), l);
    ProviderClient::new(source, lim)
}

/// One client per configured provider, NewsAPI first. Providers without a key
/// are skipped; having none at all is an error.
pub fn build_provider_clients(cfg: &AppConfig) -> Result<Vec<ProviderClient>> {
    if !cfg.has_any_provider() {
        bail!("no news provider configured: set NEWS_API_KEY and/or GNEWS_API_KEY");
    }
    let http = build_http_client(Duration::from_secs(cfg.attempt_timeout_secs))?;
    let mut clients = Vec::new();

    match &cfg.news_api_key {
        Some(key) => clients.push(client(
            Arc::new(NewsApiSource::new(http.clone(), key.clone())),
            cfg.newsapi_limit,
        )),
        None => warn!("NEWS_API_KEY missing; NewsAPI disabled"),
    }
    match &cfg.gnews_api_key {
        Some(key) => clients.push(client(
            Arc::new(GNewsSource::new(http, key.clone(), cfg.gnews_max_articles)),
            cfg.gnews_limit,
        )),
        None => warn!("GNEWS_API_KEY missing; GNews disabled"),
    }
    Ok(clients)
}

pub fn build_aggregator(cfg: &AppConfig) -> Result<Aggregator> {
    let clients = build_provider_clients(cfg)?;
    let cache: CacheFallback<AggregationResult> = CacheFallback::new(
        Arc::new(MemoryCache::with_capacity(cfg.cache_max_entries)),
        Duration::from_secs(cfg.cache_ttl_secs),
    );
    let agg = Aggregator::new(clients, cache)
        .with_request_timeout(Duration::from_secs(cfg.request_timeout_secs));
    info!(providers = ?agg.provider_names(), "aggregator ready");
    Ok(agg)
}
