//! Error taxonomy for the aggregation pipeline.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::rate_limit::RateLimitExceeded;

/// Failure of a single upstream attempt. Cheap to clone so one outcome can be
/// handed to every caller waiting on the same fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Explicit throttling status (HTTP 429).
    #[error("upstream throttled the request (status {status})")]
    Throttled { status: u16 },

    /// Error payload or non-success status from the provider.
    #[error("upstream error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    #[error("undecodable response: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// Refused locally before going out.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(Arc::new(e))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(Arc::new(e))
    }
}

impl FetchError {
    /// 429-equivalent: caller enters cooldown and waits a full window.
    pub fn is_explicit_throttle(&self) -> bool {
        matches!(self, FetchError::Throttled { .. })
    }

    /// Rate-limit flavoured failure that deserves an exponential backoff.
    pub fn is_soft_throttle(&self) -> bool {
        match self {
            FetchError::RateLimited(_) => true,
            FetchError::Api { message, .. } => mentions_rate_limit(message),
            _ => false,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("rate limit") || m.contains("ratelimit") || m.contains("ratelimited") || m.contains("too many requests")
}

/// Errors surfaced by the aggregation pipeline.
#[derive(Debug, Clone, Error)]
pub enum NewsError {
    #[error("{provider} rate limit exceeded, retry in {}s", retry_after.as_secs_f64().ceil() as u64)]
    RateLimitExceeded {
        provider: String,
        retry_after: Duration,
    },

    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: FetchError,
    },

    #[error("all providers failed: {}", join_failures(.0))]
    AllProvidersFailed(Vec<NewsError>),

    /// The fetch failed and nothing was cached for the key.
    #[error("no data available for {key}: {cause}")]
    FetchFailed {
        key: String,
        #[source]
        cause: Box<NewsError>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

fn join_failures(errs: &[NewsError]) -> String {
    if errs.is_empty() {
        return "no providers configured".to_string();
    }
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl NewsError {
    /// Stable classification string for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            NewsError::RateLimitExceeded { .. } => "rate_limited",
            NewsError::Provider { .. } => "provider_error",
            NewsError::AllProvidersFailed(_) => "all_providers_failed",
            NewsError::FetchFailed { .. } => "no_data_available",
            NewsError::InvalidInput(_) => "invalid_input",
            NewsError::Timeout(_) => "timeout",
        }
    }

    /// Provider name for provider-scoped failures.
    pub fn provider(&self) -> Option<&str> {
        match self {
            NewsError::RateLimitExceeded { provider, .. } | NewsError::Provider { provider, .. } => {
                Some(provider)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_throttle_detects_rate_limit_messages() {
        let e = FetchError::Api {
            status: 200,
            message: "You have reached your request Rate Limit".into(),
        };
        assert!(e.is_soft_throttle());
        assert!(!e.is_explicit_throttle());

        let e = FetchError::Api {
            status: 401,
            message: "apiKeyInvalid".into(),
        };
        assert!(!e.is_soft_throttle());

        assert!(FetchError::Throttled { status: 429 }.is_explicit_throttle());
    }

    #[test]
    fn all_providers_failed_lists_every_cause() {
        let e = NewsError::AllProvidersFailed(vec![
            NewsError::Provider {
                provider: "NewsAPI".into(),
                source: FetchError::Throttled { status: 429 },
            },
            NewsError::RateLimitExceeded {
                provider: "GNews".into(),
                retry_after: Duration::from_secs(12),
            },
        ]);
        let msg = e.to_string();
        assert!(msg.contains("NewsAPI: upstream throttled"));
        assert!(msg.contains("GNews rate limit exceeded, retry in 12s"));
        assert_eq!(e.kind(), "all_providers_failed");
    }
}
