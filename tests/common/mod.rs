// tests/common/mod.rs
// Scripted provider shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use news_sentiment_aggregator::error::FetchError;
use news_sentiment_aggregator::ingest::client::ProviderClient;
use news_sentiment_aggregator::ingest::types::{Category, Language, NewsSource, ProviderArticle};
use news_sentiment_aggregator::rate_limit::RateLimiter;

#[derive(Debug, Clone)]
pub enum Reply {
    Articles(Vec<ProviderArticle>),
    /// Non-throttle upstream failure.
    Fail(u16, &'static str),
    /// HTTP 429.
    Throttle,
}

pub struct MockSource {
    name: &'static str,
    reply: Mutex<Reply>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &'static str, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Mutex::new(reply),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> Result<Vec<ProviderArticle>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let reply = self.reply.lock().clone();
        match reply {
            Reply::Articles(a) => Ok(a),
            Reply::Fail(status, msg) => Err(FetchError::Api {
                status,
                message: msg.to_string(),
            }),
            Reply::Throttle => Err(FetchError::Throttled { status: 429 }),
        }
    }
}

#[async_trait]
impl NewsSource for MockSource {
    async fn headlines(
        &self,
        _category: Category,
        _language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError> {
        self.respond().await
    }

    async fn search(
        &self,
        _query: &str,
        _language: Language,
    ) -> Result<Vec<ProviderArticle>, FetchError> {
        self.respond().await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Client with a generous limiter, so only the script decides outcomes.
pub fn client(source: Arc<MockSource>) -> ProviderClient {
    client_with_limit(source, 100, Duration::from_secs(60))
}

pub fn client_with_limit(source: Arc<MockSource>, max: u32, window: Duration) -> ProviderClient {
    let name = source.name;
    ProviderClient::new(source, RateLimiter::new(name, max, window))
}

pub fn article(title: &str, source: &str) -> ProviderArticle {
    article_with(title, None, source)
}

pub fn article_with(title: &str, description: Option<&str>, source: &str) -> ProviderArticle {
    ProviderArticle {
        title: title.to_string(),
        description: description.map(str::to_string),
        url: format!("https://example.test/{}", title.replace(' ', "-").to_lowercase()),
        image_url: None,
        source_name: source.to_string(),
        published_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}
