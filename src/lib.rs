// src/lib.rs
// Public library surface for integration tests and the Shuttle binary.

pub mod aggregate;
pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod fallback;
pub mod ingest;
pub mod metrics;
pub mod rate_limit;
pub mod sentiment;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{AggregationResult, Aggregator, ArticleFilter};
pub use crate::api::router;
pub use crate::bootstrap::build_aggregator;
pub use crate::error::NewsError;
pub use crate::ingest::types::{Article, Category, Language};

use std::sync::Arc;

use axum::Router;

use crate::config::AppConfig;

/// Full application router: API routes plus `/metrics`.
pub fn app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let metrics = crate::metrics::Metrics::init(cfg.cache_ttl_secs)?;
    let aggregator = Arc::new(build_aggregator(cfg)?);
    let state = api::AppState::new(aggregator, cfg);
    Ok(router(state).merge(metrics.router()))
}
