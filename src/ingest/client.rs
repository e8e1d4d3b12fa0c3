// src/ingest/client.rs
//! Rate-limited, retrying wrapper around one [`NewsSource`].

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::{FetchError, NewsError};
use crate::ingest::types::{Category, Language, NewsSource, ProviderArticle};
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Generic throttling waits `base_backoff * 2^attempt`.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX))
    }
}

enum Call<'a> {
    Headlines(Category, Language),
    Search(&'a str, Language),
}

pub struct ProviderClient {
    source: Arc<dyn NewsSource>,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl ProviderClient {
    pub fn new(source: Arc<dyn NewsSource>, limiter: RateLimiter) -> Self {
        Self {
            source,
            limiter,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub async fn fetch_headlines(
        &self,
        category: Category,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, NewsError> {
        self.run(Call::Headlines(category, language)).await
    }

    pub async fn fetch_search(
        &self,
        query: &str,
        language: Language,
    ) -> Result<Vec<ProviderArticle>, NewsError> {
        self.run(Call::Search(query, language)).await
    }

    async fn attempt(&self, call: &Call<'_>) -> Result<Vec<ProviderArticle>, FetchError> {
        self.limiter.try_acquire()?;
        match *call {
            Call::Headlines(category, language) => self.source.headlines(category, language).await,
            Call::Search(query, language) => self.source.search(query, language).await,
        }
    }

    async fn run(&self, call: Call<'_>) -> Result<Vec<ProviderArticle>, NewsError> {
        let provider = self.name();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self.attempt(&call).await {
                Ok(articles) => {
                    debug!(provider, attempt, count = articles.len(), "provider fetch ok");
                    return Ok(articles);
                }
                Err(e) => e,
            };

            let wait = if err.is_explicit_throttle() {
                // Saturate the window even on the last attempt so siblings
                // sharing this limiter back off too.
                self.limiter.enter_cooldown();
                Some(self.limiter.window())
            } else if err.is_soft_throttle() {
                Some(self.policy.backoff_for(attempt))
            } else {
                None
            };

            match wait {
                Some(wait) if attempt < self.policy.max_attempts => {
                    info!(
                        provider,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "provider throttled; retrying"
                    );
                    counter!("news_provider_retries_total", "provider" => provider).increment(1);
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    warn!(provider, attempt, error = %err, "provider fetch failed");
                    counter!("news_provider_errors_total", "provider" => provider).increment(1);
                    return Err(match err {
                        FetchError::RateLimited(rl) => NewsError::RateLimitExceeded {
                            provider: provider.to_string(),
                            retry_after: rl.retry_after,
                        },
                        other => NewsError::Provider {
                            provider: provider.to_string(),
                            source: other,
                        },
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted outcomes, one per attempt.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<Vec<ProviderArticle>, FetchError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<Vec<ProviderArticle>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            })
        }

        fn next(&self) -> Result<Vec<ProviderArticle>, FetchError> {
            *self.calls.lock() += 1;
            self.outcomes.lock().pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl NewsSource for Scripted {
        async fn headlines(&self, _: Category, _: Language) -> Result<Vec<ProviderArticle>, FetchError> {
            self.next()
        }
        async fn search(&self, _: &str, _: Language) -> Result<Vec<ProviderArticle>, FetchError> {
            self.next()
        }
        fn name(&self) -> &'static str {
            "Scripted"
        }
    }

    fn client(src: Arc<Scripted>, max: u32) -> ProviderClient {
        ProviderClient::new(src, RateLimiter::new("Scripted", max, Duration::from_secs(60)))
    }

    #[test]
    fn backoff_doubles_from_base() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for(1), Duration::from_secs(2));
        assert_eq!(p.backoff_for(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn soft_throttle_is_retried_with_backoff() {
        let src = Scripted::new(vec![
            Err(FetchError::Api {
                status: 403,
                message: "rate limit reached".into(),
            }),
            Ok(Vec::new()),
        ]);
        let c = client(src.clone(), 10);

        let start = tokio::time::Instant::now();
        let out = c.fetch_headlines(Category::General, Language::En).await;
        assert!(out.is_ok());
        assert_eq!(src.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_gives_up_on_soft_throttle() {
        let src = Scripted::new(vec![
            Err(FetchError::Api {
                status: 403,
                message: "rate limit reached".into(),
            }),
            Ok(Vec::new()),
        ]);
        let c = client(src.clone(), 10).with_policy(RetryPolicy {
            max_attempts: 1,
            base_backoff: Duration::from_millis(100),
        });

        let start = tokio::time::Instant::now();
        let err = c.fetch_headlines(Category::General, Language::En).await.unwrap_err();
        assert_eq!(src.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(err.kind(), "provider_error");
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_throttle_waits_full_cooldown_and_saturates_limiter() {
        let src = Scripted::new(vec![Err(FetchError::Throttled { status: 429 }), Ok(Vec::new())]);
        let c = client(src.clone(), 5);

        let start = tokio::time::Instant::now();
        let out = c.fetch_headlines(Category::Sports, Language::En).await;
        assert!(out.is_ok());
        assert_eq!(src.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn non_throttle_errors_are_not_retried() {
        let src = Scripted::new(vec![Err(FetchError::Api {
            status: 401,
            message: "apiKeyInvalid".into(),
        })]);
        let c = client(src.clone(), 5);

        let err = c.fetch_search("rust", Language::En).await.unwrap_err();
        assert_eq!(src.calls(), 1);
        assert_eq!(err.kind(), "provider_error");
        assert_eq!(err.provider(), Some("Scripted"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_local_limit_surfaces_rate_limit_exceeded() {
        let src = Scripted::new(vec![]);
        let c = client(src.clone(), 1);
        // Burn the only slot in the window.
        c.limiter().try_acquire().unwrap();

        let err = c
            .fetch_headlines(Category::Health, Language::En)
            .await
            .unwrap_err();
        // 2s + 4s of backoff is not enough to roll a 60s window.
        assert_eq!(src.calls(), 0);
        assert!(matches!(err, NewsError::RateLimitExceeded { .. }));
    }
}
