//! Short per-category digest built from already aggregated headlines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ingest::types::{Article, Category};

pub const DIGEST_CATEGORIES: [Category; 4] = [
    Category::General,
    Category::Business,
    Category::Technology,
    Category::Sports,
];

const TOP_STORIES: usize = 5;
const SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestItem {
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    #[serde(flatten)]
    pub sections: BTreeMap<Category, Vec<DigestItem>>,
    pub timestamp: DateTime<Utc>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            sections: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// First five articles, description cut to 100 characters.
pub fn generate_digest(articles: &[Article], category: Category) -> Vec<DigestItem> {
    articles
        .iter()
        .take(TOP_STORIES)
        .map(|a| DigestItem {
            title: a.title.clone(),
            summary: summarize(a.description.as_deref()),
            category,
            url: a.url.clone(),
            published_at: a.published_at,
        })
        .collect()
}

fn summarize(description: Option<&str>) -> String {
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => {
            let cut: String = d.chars().take(SUMMARY_CHARS).collect();
            format!("{cut}...")
        }
        None => "No description available".to_string(),
    }
}
