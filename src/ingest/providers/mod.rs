pub mod gnews;
pub mod newsapi;

use std::time::Duration;

use anyhow::Context;
use metrics::counter;

use crate::error::FetchError;

/// Shared HTTP client; `attempt_timeout` bounds every single upstream attempt.
pub fn build_http_client(attempt_timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .connect_timeout(Duration::from_secs(4))
        .timeout(attempt_timeout)
        .build()
        .context("building reqwest client")
}

/// Send a GET and hand back (status, body). 429 short-circuits to `Throttled`.
pub(crate) async fn get_text(
    req: reqwest::RequestBuilder,
    provider: &'static str,
) -> Result<(u16, String), FetchError> {
    let resp = req.send().await?;
    let status = resp.status().as_u16();
    if status == 429 {
        return Err(FetchError::Throttled { status });
    }
    let body = resp.text().await?;
    tracing::debug!(provider, status, bytes = body.len(), "provider response");
    Ok((status, body))
}

pub(crate) fn record_parsed(provider: &'static str, n: usize) {
    counter!("news_provider_articles_total", "provider" => provider).increment(n as u64);
}

/// First 200 chars of a body, for error messages.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
