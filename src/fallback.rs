//! # Cache fallback
//! Read-or-fetch coordinator on top of a [`CacheStore`].
//!
//! Per key: a fresh entry short-circuits the fetch; otherwise the fetch runs
//! and its result is stored; if the fetch fails, whatever entry exists is
//! served regardless of age, and only an empty key surfaces the failure.
//!
//! Concurrent callers on the same key share one fetch: the first caller
//! leads, later callers wait for the leader's outcome (success or failure)
//! instead of issuing their own. Every caller, leader or waiter, is bounded by
//! the request timeout measured from its own call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::NewsError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    StaleServing,
}

/// A value plus where it came from.
#[derive(Debug, Clone)]
pub struct Served<V> {
    pub value: V,
    pub served_from_cache: bool,
    /// Set only when a stale entry stood in for a failed fetch.
    pub staleness: Option<String>,
    pub created_at: DateTime<Utc>,
}

type Outcome<V> = Result<Served<V>, NewsError>;
type Flight<V> = watch::Receiver<Option<Outcome<V>>>;

enum Role<V> {
    Leader(watch::Sender<Option<Outcome<V>>>),
    Waiter(Flight<V>),
}

/// Clears the in-flight marker when the leader finishes or is dropped
/// mid-fetch; waiters then see a closed channel and retry.
struct FlightGuard<'a, V> {
    flights: &'a Mutex<HashMap<String, Flight<V>>>,
    key: &'a str,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        self.flights.lock().remove(self.key);
    }
}

pub struct CacheFallback<V> {
    store: Arc<dyn CacheStore<V>>,
    ttl: Duration,
    timeout: Duration,
    /// Only keys with a fetch currently running.
    flights: Mutex<HashMap<String, Flight<V>>>,
}

impl<V: Clone + Send + Sync + 'static> CacheFallback<V> {
    pub fn new(store: Arc<dyn CacheStore<V>>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of keys with a fetch in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Outcome<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, NewsError>>,
    {
        let deadline = Instant::now() + self.timeout;

        let tx = loop {
            if let Some(hit) = self.fresh_hit(key) {
                return Ok(hit);
            }
            match self.join(key) {
                Role::Leader(tx) => break tx,
                Role::Waiter(rx) => {
                    if let Some(outcome) = self.wait(key, rx, deadline).await {
                        return outcome;
                    }
                    debug!(key, "in-flight fetch abandoned; taking over");
                }
            }
        };
        let _flight = FlightGuard {
            flights: &self.flights,
            key,
        };

        // A previous leader may have stored a value between our check and join.
        if let Some(hit) = self.fresh_hit(key) {
            tx.send_replace(Some(Ok(hit.clone())));
            return Ok(hit);
        }

        counter!("news_cache_misses_total").increment(1);
        let outcome = match tokio::time::timeout_at(deadline, fetch()).await {
            Ok(Ok(value)) => {
                self.store.set(key, value.clone());
                info!(key, "cache refreshed");
                Ok(Served {
                    value,
                    served_from_cache: false,
                    staleness: None,
                    created_at: Utc::now(),
                })
            }
            Ok(Err(err)) => self.fall_back(key, err),
            Err(_) => self.fall_back(key, NewsError::Timeout(self.timeout)),
        };
        tx.send_replace(Some(outcome.clone()));
        outcome
    }

    fn fresh_hit(&self, key: &str) -> Option<Served<V>> {
        let entry = self.store.get(key)?;
        if entry.is_stale(self.ttl) {
            return None;
        }
        debug!(key, age_secs = entry.age().as_secs(), "cache hit");
        counter!("news_cache_hits_total").increment(1);
        Some(Served {
            value: entry.value,
            served_from_cache: true,
            staleness: None,
            created_at: entry.created_at,
        })
    }

    fn join(&self, key: &str) -> Role<V> {
        let mut flights = self.flights.lock();
        if let Some(rx) = flights.get(key) {
            return Role::Waiter(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_string(), rx);
        Role::Leader(tx)
    }

    /// `None` when the leader went away without an answer.
    async fn wait(&self, key: &str, mut rx: Flight<V>, deadline: Instant) -> Option<Outcome<V>> {
        match tokio::time::timeout_at(deadline, rx.wait_for(Option::is_some)).await {
            Ok(Ok(shared)) => {
                let outcome = shared.as_ref().cloned()?;
                debug!(key, ok = outcome.is_ok(), "joined in-flight fetch");
                Some(outcome.map(|mut served| {
                    served.served_from_cache = true;
                    served
                }))
            }
            Ok(Err(_)) => None,
            Err(_) => Some(self.fall_back(key, NewsError::Timeout(self.timeout))),
        }
    }

    fn fall_back(&self, key: &str, err: NewsError) -> Outcome<V> {
        match self.store.get(key) {
            Some(entry) => {
                self.store.mark_stale(key, true);
                counter!("news_cache_stale_served_total").increment(1);
                warn!(
                    key,
                    age_secs = entry.age().as_secs(),
                    error = %err,
                    "refresh failed; serving stale cache"
                );
                Ok(Served {
                    value: entry.value,
                    served_from_cache: true,
                    staleness: Some(stale_note(&err, entry.created_at)),
                    created_at: entry.created_at,
                })
            }
            None => {
                warn!(key, error = %err, "refresh failed; nothing cached to fall back to");
                Err(NewsError::FetchFailed {
                    key: key.to_string(),
                    cause: Box::new(err),
                })
            }
        }
    }

    /// `Fresh` covers any stored entry that is not standing in for a failed
    /// refresh, including one past its TTL that nobody has asked for yet.
    pub fn state(&self, key: &str) -> CacheState {
        match self.store.get(key) {
            None => CacheState::Empty,
            Some(e) if e.serving_stale => CacheState::StaleServing,
            Some(_) => CacheState::Fresh,
        }
    }

    pub fn evict(&self, key: &str) -> bool {
        self.store.evict(key)
    }
}

fn stale_note(err: &NewsError, created_at: DateTime<Utc>) -> String {
    let reason = match err {
        NewsError::RateLimitExceeded { .. } => "upstream rate limits",
        NewsError::Timeout(_) => "an upstream timeout",
        _ => "an upstream error",
    };
    format!(
        "Using cached data from {} due to {reason}",
        created_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(ttl: Duration) -> CacheFallback<Vec<u32>> {
        CacheFallback::new(Arc::new(MemoryCache::new()), ttl)
    }

    #[tokio::test]
    async fn fresh_entry_skips_fetch() {
        let cf = orchestrator(DEFAULT_TTL);
        let first = cf.get_or_fetch("k", || async { Ok(vec![1, 2]) }).await.unwrap();
        assert!(!first.served_from_cache);
        assert_eq!(cf.state("k"), CacheState::Fresh);

        let second = cf
            .get_or_fetch("k", || async { Err(NewsError::InvalidInput("must not run".into())) })
            .await
            .unwrap();
        assert!(second.served_from_cache);
        assert!(second.staleness.is_none());
        assert_eq!(second.value, first.value);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_stale_until_next_success() {
        let cf = orchestrator(Duration::from_secs(60));
        cf.get_or_fetch("k", || async { Ok(vec![1]) }).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let stale = cf
            .get_or_fetch("k", || async { Err(NewsError::AllProvidersFailed(vec![])) })
            .await
            .unwrap();
        assert!(stale.served_from_cache);
        assert_eq!(stale.value, vec![1]);
        assert!(stale.staleness.as_deref().unwrap().contains("upstream error"));
        assert_eq!(cf.state("k"), CacheState::StaleServing);

        let fresh = cf.get_or_fetch("k", || async { Ok(vec![2]) }).await.unwrap();
        assert!(!fresh.served_from_cache);
        assert_eq!(fresh.value, vec![2]);
        assert_eq!(cf.state("k"), CacheState::Fresh);
    }

    #[tokio::test]
    async fn empty_key_failure_is_fetch_failed() {
        let cf = orchestrator(DEFAULT_TTL);
        let err = cf
            .get_or_fetch("k", || async { Err(NewsError::AllProvidersFailed(vec![])) })
            .await
            .unwrap_err();
        assert!(matches!(err, NewsError::FetchFailed { .. }));
        assert_eq!(err.kind(), "no_data_available");
        assert_eq!(cf.state("k"), CacheState::Empty);
    }

    #[tokio::test]
    async fn concurrent_cold_callers_share_one_fetch() {
        let cf = Arc::new(orchestrator(DEFAULT_TTL));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cf = cf.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cf.get_or_fetch("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(vec![42])
                })
                .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().value, vec![42]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cf.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_share_a_timed_out_fetch_instead_of_queueing() {
        let cf = orchestrator(DEFAULT_TTL).with_timeout(Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let results = join_all((0..3).map(|_| async {
            let res = cf
                .get_or_fetch("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(vec![1])
                })
                .await;
            (started.elapsed(), res)
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for (elapsed, res) in results {
            assert!(elapsed <= Duration::from_secs(5), "{elapsed:?}");
            match res.unwrap_err() {
                NewsError::FetchFailed { cause, .. } => {
                    assert!(matches!(*cause, NewsError::Timeout(_)))
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_is_taken_over_by_a_waiter() {
        let cf = Arc::new(orchestrator(DEFAULT_TTL));

        let leader = {
            let cf = cf.clone();
            tokio::spawn(async move {
                cf.get_or_fetch("k", || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(vec![1])
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(cf.in_flight(), 1);

        let waiter = {
            let cf = cf.clone();
            tokio::spawn(async move { cf.get_or_fetch("k", || async { Ok(vec![2]) }).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        leader.abort();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.value, vec![2]);
        assert!(!got.served_from_cache);
        assert_eq!(cf.in_flight(), 0);
    }

    #[tokio::test]
    async fn finished_keys_leave_no_bookkeeping_behind() {
        let cf: CacheFallback<Vec<u32>> =
            CacheFallback::new(Arc::new(MemoryCache::with_capacity(16)), DEFAULT_TTL);
        for i in 0..200u32 {
            let key = format!("search_q{i}_en");
            cf.get_or_fetch(&key, || async move { Ok(vec![i]) }).await.unwrap();
            assert_eq!(cf.in_flight(), 0);
        }
        let kept = (0..200u32)
            .filter(|i| cf.state(&format!("search_q{i}_en")) != CacheState::Empty)
            .count();
        assert_eq!(kept, 16);
    }

    #[tokio::test]
    async fn evict_resets_to_empty() {
        let cf = orchestrator(DEFAULT_TTL);
        cf.get_or_fetch("k", || async { Ok(vec![1]) }).await.unwrap();
        assert!(cf.evict("k"));
        assert_eq!(cf.state("k"), CacheState::Empty);
        assert_eq!(cf.in_flight(), 0);
    }
}
