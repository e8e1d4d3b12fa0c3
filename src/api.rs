use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::aggregate::{ArticleFilter, Aggregator, SourceMatch};
use crate::config::app::key_status;
use crate::config::AppConfig;
use crate::digest::generate_digest;
use crate::error::NewsError;
use crate::ingest::types::{Category, Language};
use crate::sentiment::SentimentLabel;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub newsapi_key: &'static str,
    pub gnews_key: &'static str,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, cfg: &AppConfig) -> Self {
        Self {
            aggregator,
            newsapi_key: key_status(&cfg.news_api_key),
            gnews_key: key_status(&cfg.gnews_api_key),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/news", get(news))
        .route("/api/news/{category}", get(news_by_category))
        .route("/api/search", get(search))
        .route("/api/digest", get(digest))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error body is always `{error, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    News(#[from] NewsError),

    #[error("{0}")]
    NoArticles(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::News(e) => (status_for(e), e.kind()),
            ApiError::NoArticles(_) => (StatusCode::NOT_FOUND, "no_articles"),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        let message = match public_message(status) {
            Some(generic) => generic.to_string(),
            None => self.to_string(),
        };
        let payload = Json(json!({"error": kind, "message": message}));
        (status, payload).into_response()
    }
}

/// Server-side failures may carry upstream response text; clients only get
/// a fixed description, the detail stays in the log.
fn public_message(status: StatusCode) -> Option<&'static str> {
    match status {
        StatusCode::BAD_GATEWAY => Some("Upstream news providers failed"),
        StatusCode::SERVICE_UNAVAILABLE => Some("No news data available right now; try again later"),
        StatusCode::GATEWAY_TIMEOUT => Some("Upstream news providers timed out"),
        s if s.is_server_error() => Some("Internal error"),
        _ => None,
    }
}

fn status_for(e: &NewsError) -> StatusCode {
    match e {
        NewsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        NewsError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        NewsError::Provider { .. } => StatusCode::BAD_GATEWAY,
        NewsError::AllProvidersFailed(_) => StatusCode::BAD_GATEWAY,
        NewsError::FetchFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        NewsError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    }
}

#[derive(Debug, Default, Deserialize)]
struct NewsParams {
    category: Option<String>,
    language: Option<String>,
    source: Option<String>,
    sentiment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    language: Option<String>,
    source: Option<String>,
    sentiment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageParam {
    language: Option<String>,
}

fn parse_language(raw: Option<&str>) -> Result<Language, NewsError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Language::En),
        Some(s) => s.to_lowercase().parse(),
    }
}

fn parse_category(raw: Option<&str>) -> Result<Category, NewsError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Category::General),
        Some(s) => s.to_lowercase().parse(),
    }
}

fn build_filter(
    source: Option<String>,
    sentiment: Option<&str>,
    source_match: SourceMatch,
) -> Result<ArticleFilter, NewsError> {
    let sentiment = match sentiment.map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(s) => Some(SentimentLabel::parse(s).ok_or_else(|| {
            NewsError::InvalidInput(
                "Sentiment must be one of: very_positive, positive, neutral, negative, very_negative"
                    .to_string(),
            )
        })?),
    };
    Ok(ArticleFilter {
        source,
        sentiment,
        source_match,
    })
}

fn cache_message(cached: bool, note: Option<&str>) -> String {
    match (cached, note) {
        (_, Some(n)) => n.to_string(),
        (true, None) => "Served from cache".to_string(),
        (false, None) => "Fresh data".to_string(),
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "providers": {
            "newsApi": state.newsapi_key,
            "gnews": state.gnews_key,
        },
    }))
}

async fn news(
    State(state): State<AppState>,
    Query(p): Query<NewsParams>,
) -> Result<Json<Value>, ApiError> {
    let category = parse_category(p.category.as_deref())?;
    let language = parse_language(p.language.as_deref())?;
    let filter = build_filter(p.source, p.sentiment.as_deref(), SourceMatch::Exact)?;

    let result = state.aggregator.aggregate(category, language).await?;
    if result.articles.is_empty() {
        return Err(ApiError::NoArticles(format!(
            "No articles available for {category}/{language}"
        )));
    }

    let articles = filter.apply(&result.articles);
    Ok(Json(json!({
        "total": articles.len(),
        "articles": articles,
        "category": category,
        "language": language,
        "sources": result.sources_used,
        "timestamp": result.timestamp,
        "cached": result.served_from_cache,
        "message": cache_message(result.served_from_cache, result.staleness_note.as_deref()),
    })))
}

async fn news_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let category = parse_category(Some(&category))?;
    let result = state.aggregator.aggregate(category, Language::En).await?;
    let digest = generate_digest(&result.articles, category);

    Ok(Json(json!({
        "articles": result.articles,
        "digest": digest,
        "timestamp": result.timestamp,
        "cached": result.served_from_cache,
        "message": cache_message(result.served_from_cache, result.staleness_note.as_deref()),
    })))
}

async fn search(
    State(state): State<AppState>,
    Query(p): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    let language = parse_language(p.language.as_deref())?;
    let filter = build_filter(p.source, p.sentiment.as_deref(), SourceMatch::Contains)?;
    let query = p.q.unwrap_or_default();

    let articles = state.aggregator.search(&query, language, &filter).await?;
    if articles.is_empty() {
        return Err(ApiError::NoArticles(
            "No articles found matching your search criteria".to_string(),
        ));
    }

    Ok(Json(json!({
        "query": query.trim(),
        "language": language,
        "total": articles.len(),
        "articles": articles,
        "timestamp": Utc::now(),
    })))
}

async fn digest(
    State(state): State<AppState>,
    Query(p): Query<LanguageParam>,
) -> Result<Json<Value>, ApiError> {
    let language = parse_language(p.language.as_deref())?;
    let digest = state.aggregator.digest(language).await;
    Ok(Json(json!({ "digest": digest, "language": language })))
}
