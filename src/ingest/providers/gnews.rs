// src/ingest/providers/gnews.rs
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::providers::{get_text, record_parsed, snippet};
use crate::ingest::types::{Category, Language, NewsSource, ProviderArticle};
use crate::ingest::{
    normalize_image_url, normalize_opt, normalize_text, parse_published_at,
    source_name_or_default,
};

pub const GNEWS_BASE_URL: &str = "https://gnews.io/api/v4";
const NAME: &str = "GNews";

/// GNews answers either with `errors` or with `articles`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GNewsResponse {
    Failure { errors: Value },
    Success { articles: Vec<GNewsArticle> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GNewsArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    image: Option<String>,
    published_at: Option<String>,
    source: Option<GNewsSourceRef>,
}

#[derive(Debug, Deserialize)]
struct GNewsSourceRef {
    name: Option<String>,
}

/// `errors` is a list of strings or a `{field: message}` object depending on the endpoint.
fn errors_to_message(errors: &Value) -> String {
    match errors {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
            .collect::<Vec<_>>()
            .join("; "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn normalize(a: GNewsArticle) -> Option<ProviderArticle> {
    let title = normalize_text(a.title.as_deref()?);
    if title.is_empty() {
        return None;
    }
    let url = a.url.filter(|u| !u.trim().is_empty())?;
    Some(ProviderArticle {
        title,
        description: normalize_opt(a.description.as_deref()),
        url,
        image_url: normalize_image_url(a.image.as_deref()),
        source_name: source_name_or_default(a.source.as_ref().and_then(|s| s.name.as_deref())),
        published_at: parse_published_at(a.published_at.as_deref()),
    })
}

pub fn parse_response(status: u16, body: &str) -> Result<Vec<ProviderArticle>, FetchError> {
    if status == 429 {
        return Err(FetchError::Throttled { status });
    }
    let parsed: GNewsResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(_) if !(200..300).contains(&status) => {
            return Err(FetchError::Api {
                status,
                message: snippet(body),
            })
        }
        Err(e) => return Err(e.into()),
    };

    match parsed {
        GNewsResponse::Failure { errors } => {
            let message = errors_to_message(&errors);
            Err(FetchError::Api {
                status,
                message: if message.is_empty() {
                    "GNews error".to_string()
                } else {
                    message
                },
            })
        }
        GNewsResponse::Success { articles } => {
            let out: Vec<_> = articles.into_iter().filter_map(normalize).collect();
            record_parsed(NAME, out.len());
            Ok(out)
        }
    }
}

pub struct GNewsSource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_articles: u32,
}

impl GNewsSource {
    pub fn new(http: reqwest::Client, api_key: String, max_articles: u32) -> Self {
        Self {
            http,
            api_key,
            base_url: GNEWS_BASE_URL.to_string(),
            max_articles,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl NewsSource for GNewsSource {
    async fn headlines(
        &self,
        category: Category,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError> {
        let max = self.max_articles.to_string();
        let req = self
            .http
            .get(format!("{}/top-headlines", self.base_url))
            .query(&[
                ("category", category.as_str()),
                ("lang", language.as_str()),
                ("max", max.as_str()),
                ("apikey", self.api_key.as_str()),
            ]);
        let (status, body) = get_text(req, NAME).await?;
        parse_response(status, &body)
    }

    async fn search(
        &self,
        query: &str,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError> {
        let max = self.max_articles.to_string();
        let req = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("lang", language.as_str()),
                ("max", max.as_str()),
                ("apikey", self.api_key.as_str()),
            ]);
        let (status, body) = get_text(req, NAME).await?;
        parse_response(status, &body)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
