//! # Sentiment
//! Lexicon-based polarity scoring for headlines.
//!
//! Each token is looked up in an AFINN-style table (`-5..=5`), the sum is
//! normalized by the token count and the result is bucketed into one of five
//! labels. Negators within the three preceding tokens flip a word's polarity.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).unwrap_or_else(|e| {
        tracing::error!(error = %e, "sentiment lexicon failed to parse; scoring everything neutral");
        HashMap::new()
    })
});

/// Coarse polarity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    VeryPositive,
    Positive,
    Neutral,
    Negative,
    VeryNegative,
}

impl SentimentLabel {
    /// Bucket a normalized score.
    ///
    /// `> 0.5` very positive, `(0.2, 0.5]` positive, `[-0.2, 0.2]` neutral,
    /// `[-0.5, -0.2)` negative, `< -0.5` very negative.
    pub fn from_score(score: f64) -> Self {
        if score > 0.5 {
            Self::VeryPositive
        } else if score > 0.2 {
            Self::Positive
        } else if score < -0.5 {
            Self::VeryNegative
        } else if score < -0.2 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::VeryPositive => "😊",
            Self::Positive => "🙂",
            Self::Neutral => "😐",
            Self::Negative => "😕",
            Self::VeryNegative => "😢",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryPositive => "very_positive",
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::VeryNegative => "very_negative",
        }
    }

    /// Parse the wire form (`very_positive`, ...). Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "very_positive" => Some(Self::VeryPositive),
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            "very_negative" => Some(Self::VeryNegative),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored sentiment attached to every served article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f64,
    pub label: SentimentLabel,
    pub emoji: String,
}

impl Sentiment {
    pub fn from_score(score: f64) -> Self {
        let label = SentimentLabel::from_score(score);
        Self {
            score,
            label,
            emoji: label.emoji().to_string(),
        }
    }

    pub fn neutral() -> Self {
        Self::from_score(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        LEXICON.get(w).copied().unwrap_or(0)
    }

    /// Returns (raw polarity sum, token count).
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        // Collected because the negation check looks back.
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for (i, w) in tokens.iter().enumerate() {
            let base = self.word_score(w);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    /// Normalized score (sum / token count) bucketed into a [`Sentiment`].
    /// Empty text is neutral.
    pub fn analyze(&self, text: &str) -> Sentiment {
        let (sum, n) = self.score_text(text);
        let score = if n == 0 { 0.0 } else { sum as f64 / n as f64 };
        Sentiment::from_score(score)
    }

    /// Score an article the way the merge step does: title, a space, description.
    pub fn analyze_article(&self, title: &str, description: Option<&str>) -> Sentiment {
        let text = format!("{} {}", title, description.unwrap_or_default());
        self.analyze(&text)
    }
}

/// Alphanumeric tokens (apostrophes kept so "isn't" survives), lower-case.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "without"
    )
}
