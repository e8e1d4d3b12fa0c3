// src/ingest/types.rs
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, NewsError};
use crate::sentiment::Sentiment;

pub const UNKNOWN_SOURCE: &str = "Unknown Source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Business,
    Technology,
    Sports,
    Entertainment,
    Health,
    Science,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::General,
        Category::Business,
        Category::Technology,
        Category::Sports,
        Category::Entertainment,
        Category::Health,
        Category::Science,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Business => "business",
            Category::Technology => "technology",
            Category::Sports => "sports",
            Category::Entertainment => "entertainment",
            Category::Health => "health",
            Category::Science => "science",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = NewsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                NewsError::InvalidInput(format!(
                    "Category must be one of: {}",
                    Category::ALL.map(|c| c.as_str()).join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Hi];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
        }
    }

    /// Country used for country-scoped headline endpoints.
    pub fn country(self) -> &'static str {
        match self {
            Language::En => "us",
            Language::Hi => "in",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = NewsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| {
                NewsError::InvalidInput(format!(
                    "Language must be one of: {}",
                    Language::ALL.map(|l| l.as_str()).join(", ")
                ))
            })
    }
}

/// Provider-normalized article, before merge and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderArticle {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    /// Absolute http(s) URL or absent.
    pub image_url: Option<String>,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
}

/// Served article: merged, scored and tagged with the request language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub language: Language,
}

impl Article {
    pub fn from_provider(a: ProviderArticle, sentiment: Sentiment, language: Language) -> Self {
        Self {
            title: a.title,
            description: a.description,
            url: a.url,
            image_url: a.image_url,
            source_name: a.source_name,
            published_at: a.published_at,
            sentiment,
            language,
        }
    }
}

/// One upstream news API, one attempt per call. Retries, rate limiting and
/// error tagging live in [`crate::ingest::client::ProviderClient`].
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn headlines(
        &self,
        category: Category,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError>;

    async fn search(
        &self,
        query: &str,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError>;

    fn name(&self) -> &'static str;
}
