//! Title-keyed merge of per-provider article batches.

use indexmap::IndexMap;
use metrics::counter;

use crate::ingest::types::{Article, Language, ProviderArticle};
use crate::sentiment::SentimentAnalyzer;

/// Deduplicate by title across batches given in provider-call order.
///
/// A later batch's article replaces an earlier one with the same title, but
/// the title keeps the position where it was first seen.
pub fn dedup_by_title(batches: Vec<Vec<ProviderArticle>>) -> Vec<ProviderArticle> {
    let mut by_title: IndexMap<String, ProviderArticle> = IndexMap::new();
    let mut replaced = 0u64;

    for article in batches.into_iter().flatten() {
        if by_title.insert(article.title.clone(), article).is_some() {
            replaced += 1;
        }
    }

    if replaced > 0 {
        counter!("news_merge_duplicates_total").increment(replaced);
    }
    by_title.into_values().collect()
}

/// Dedup, then score every surviving article on `title + " " + description`.
pub fn merge_and_score(
    batches: Vec<Vec<ProviderArticle>>,
    analyzer: &SentimentAnalyzer,
    language: Language,
) -> Vec<Article> {
    dedup_by_title(batches)
        .into_iter()
        .map(|a| {
            let sentiment = analyzer.analyze_article(&a.title, a.description.as_deref());
            Article::from_provider(a, sentiment, language)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn art(title: &str, desc: &str, source: &str) -> ProviderArticle {
        ProviderArticle {
            title: title.to_string(),
            description: Some(desc.to_string()),
            url: format!("https://example.test/{}", title.to_lowercase()),
            image_url: None,
            source_name: source.to_string(),
            published_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn later_batch_wins_but_keeps_first_seen_position() {
        let a = vec![art("X", "a-x", "A"), art("Y", "a-y", "A")];
        let b = vec![art("Y", "b-y", "B"), art("Z", "b-z", "B")];
        let out = dedup_by_title(vec![a, b]);

        let titles: Vec<_> = out.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["X", "Y", "Z"]);
        assert_eq!(out[1].description.as_deref(), Some("b-y"));
        assert_eq!(out[1].source_name, "B");
    }

    #[test]
    fn duplicates_within_one_batch_collapse_to_the_last() {
        let a = vec![art("X", "first", "A"), art("X", "second", "A")];
        let out = dedup_by_title(vec![a]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description.as_deref(), Some("second"));
    }

    #[test]
    fn merged_articles_carry_sentiment_and_language() {
        let a = vec![art("Great win", "wonderful result", "A")];
        let out = merge_and_score(vec![a], &SentimentAnalyzer::new(), Language::Hi);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].language, Language::Hi);
        assert!(out[0].sentiment.score > 0.5);
    }
}
