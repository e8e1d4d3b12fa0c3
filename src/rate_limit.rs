//! # Rate Limiter
//! Fixed-size request window per upstream provider.
//!
//! `try_acquire` never waits: it either counts the request against the current
//! window or reports how long until the window rolls over. A throttling
//! response from upstream saturates the window via [`RateLimiter::enter_cooldown`],
//! which blocks acquisitions for one full window from that moment.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Local refusal: the window is full.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry in {}s", retry_after.as_secs_f64().ceil() as u64)]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

/// Current window state (diagnostics and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub window_start: Instant,
    pub request_count: u32,
    /// Set while the window is saturated by a cooldown.
    pub cooldown_until: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    max_requests: u32,
    window: Duration,
    state: Mutex<RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(name: &str, max_requests: u32, window: Duration) -> Self {
        Self {
            name: name.to_string(),
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(RateLimitWindow {
                window_start: Instant::now(),
                request_count: 0,
                cooldown_until: None,
            }),
        }
    }

    /// Count one request against the window, or refuse with the remaining wait.
    pub fn try_acquire(&self) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut st = self.state.lock();

        let elapsed = now.saturating_duration_since(st.window_start);
        if elapsed >= self.window {
            st.window_start = now;
            st.request_count = 0;
            st.cooldown_until = None;
        }

        if st.request_count >= self.max_requests {
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(st.window_start));
            debug!(
                limiter = %self.name,
                count = st.request_count,
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limit window full"
            );
            return Err(RateLimitExceeded { retry_after });
        }

        st.request_count += 1;
        Ok(())
    }

    /// Saturate the window starting now. This is a full-window penalty, not a
    /// separate timer: the next window reset lifts it.
    pub fn enter_cooldown(&self) {
        let now = Instant::now();
        let mut st = self.state.lock();
        st.request_count = self.max_requests;
        st.window_start = now;
        st.cooldown_until = Some(now + self.window);
        warn!(
            limiter = %self.name,
            window_secs = self.window.as_secs(),
            "upstream throttled; entering cooldown"
        );
    }

    pub fn snapshot(&self) -> RateLimitWindow {
        *self.state.lock()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
