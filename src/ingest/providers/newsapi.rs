// src/ingest/providers/newsapi.rs
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;
use crate::ingest::providers::{get_text, record_parsed, snippet};
use crate::ingest::types::{Category, Language, NewsSource, ProviderArticle};
use crate::ingest::{
    normalize_image_url, normalize_opt, normalize_text, parse_published_at,
    source_name_or_default,
};

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2";
const NAME: &str = "NewsAPI";

/// Payload shape, tagged by the `status` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum NewsApiResponse {
    Ok {
        #[serde(default)]
        articles: Vec<NewsApiArticle>,
    },
    Error {
        code: Option<String>,
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    source: Option<NewsApiSourceRef>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSourceRef {
    name: Option<String>,
}

fn normalize(a: NewsApiArticle) -> Option<ProviderArticle> {
    let title = normalize_text(a.title.as_deref()?);
    // NewsAPI keeps tombstones for pulled stories.
    if title.is_empty() || title == "[Removed]" {
        return None;
    }
    let url = a.url.filter(|u| !u.trim().is_empty())?;
    Some(ProviderArticle {
        title,
        description: normalize_opt(a.description.as_deref()),
        url,
        image_url: normalize_image_url(a.url_to_image.as_deref()),
        source_name: source_name_or_default(a.source.as_ref().and_then(|s| s.name.as_deref())),
        published_at: parse_published_at(a.published_at.as_deref()),
    })
}

/// Turn a raw NewsAPI response into articles or a classified failure.
pub fn parse_response(status: u16, body: &str) -> Result<Vec<ProviderArticle>, FetchError> {
    if status == 429 {
        return Err(FetchError::Throttled { status });
    }
    let parsed: NewsApiResponse = match serde_json::from_str(body) {
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
        NewsApiResponse::Ok { articles } => {
            let out: Vec<_> = articles.into_iter().filter_map(normalize).collect();
            record_parsed(NAME, out.len());
            Ok(out)
        }
        NewsApiResponse::Error { code, message } => Err(FetchError::Api {
            status,
            message: format!(
                "{}: {}",
                code.as_deref().unwrap_or("error"),
                message.as_deref().unwrap_or("NewsAPI error")
            ),
        }),
    }
}

pub struct NewsApiSource {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl NewsApiSource {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: NEWSAPI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl NewsSource for NewsApiSource {
    async fn headlines(
        &self,
        category: Category,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError> {
        let req = self
            .http
            .get(format!("{}/top-headlines", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("country", language.country()),
                ("category", category.as_str()),
                ("language", language.as_str()),
            ]);
        let (status, body) = get_text(req, NAME).await?;
        parse_response(status, &body)
    }

    async fn search(
        &self,
        query: &str,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError> {
        let req = self
            .http
            .get(format!("{}/everything", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query),
                ("language", language.as_str()),
                ("sortBy", "publishedAt"),
            ]);
        let (status, body) = get_text(req, NAME).await?;
        parse_response(status, &body)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_is_classified() {
        let body = r#"{"status":"error","code":"rateLimited","message":"You have made too many requests recently."}"#;
        let err = parse_response(200, body).unwrap_err();
        assert!(err.is_soft_throttle());

        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        let err = parse_response(401, body).unwrap_err();
        assert!(!err.is_soft_throttle());
        assert!(err.to_string().contains("apiKeyInvalid"));
    }

    #[test]
    fn http_429_is_explicit_throttle() {
        assert!(parse_response(429, "").unwrap_err().is_explicit_throttle());
    }

    #[test]
    fn removed_and_untitled_articles_are_dropped() {
        let body = r#"{"status":"ok","totalResults":3,"articles":[
            {"source":{"id":null,"name":"Wire"},"title":"[Removed]","url":"https://removed.com"},
            {"source":{"id":null,"name":"Wire"},"title":null,"url":"https://x.test"},
            {"source":{"id":null,"name":"Wire"},"title":"Kept","url":"https://x.test/kept"}
        ]}"#;
        let out = parse_response(200, body).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Kept");
    }
}
