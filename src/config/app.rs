// src/config/app.rs
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/news.toml";
pub const ENV_CONFIG_PATH: &str = "NEWS_CONFIG_PATH";

fn default_cache_ttl_secs() -> u64 {
    1800
}
fn default_request_timeout_secs() -> u64 {
    150
}
fn default_attempt_timeout_secs() -> u64 {
    10
}
fn default_cache_max_entries() -> usize {
    crate::cache::DEFAULT_CACHE_CAPACITY
}
fn default_gnews_max_articles() -> u32 {
    10
}

/// Sliding-window budget for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl LimitConfig {
    pub fn newsapi_default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 60,
        }
    }

    pub fn gnews_default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 60,
        }
    }

    fn sanitized(self, fallback: Self) -> Self {
        if self.max_requests == 0 || self.window_secs == 0 {
            fallback
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub news_api_key: Option<String>,
    #[serde(default)]
    pub gnews_api_key: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Oldest-written entries are dropped past this many keys.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Upper bound on one whole aggregation fetch.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upper bound on one upstream HTTP attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "LimitConfig::newsapi_default")]
    pub newsapi_limit: LimitConfig,
    #[serde(default = "LimitConfig::gnews_default")]
    pub gnews_limit: LimitConfig,
    #[serde(default = "default_gnews_max_articles")]
    pub gnews_max_articles: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            news_api_key: None,
            gnews_api_key: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            request_timeout_secs: default_request_timeout_secs(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            newsapi_limit: LimitConfig::newsapi_default(),
            gnews_limit: LimitConfig::gnews_default(),
            gnews_max_articles: default_gnews_max_articles(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file (`$NEWS_CONFIG_PATH` or `config/news.toml`
    /// if present), then environment overrides.
    pub fn load() -> Result<Self> {
        let base = match env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        let cfg = base.with_env_overrides().sanitized();
        info!(
            newsapi = key_status(&cfg.news_api_key),
            gnews = key_status(&cfg.gnews_api_key),
            cache_ttl_secs = cfg.cache_ttl_secs,
            request_timeout_secs = cfg.request_timeout_secs,
            "config loaded"
        );
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Environment wins over file values. Unparseable numbers are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(k) = env::var("NEWS_API_KEY") {
            self.news_api_key = Some(k);
        }
        if let Ok(k) = env::var("GNEWS_API_KEY") {
            self.gnews_api_key = Some(k);
        }
        override_num("CACHE_TTL_SECS", &mut self.cache_ttl_secs);
        override_num("CACHE_MAX_ENTRIES", &mut self.cache_max_entries);
        override_num("REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        override_num("ATTEMPT_TIMEOUT_SECS", &mut self.attempt_timeout_secs);
        override_num("NEWSAPI_MAX_REQUESTS", &mut self.newsapi_limit.max_requests);
        override_num("NEWSAPI_WINDOW_SECS", &mut self.newsapi_limit.window_secs);
        override_num("GNEWS_MAX_REQUESTS", &mut self.gnews_limit.max_requests);
        override_num("GNEWS_WINDOW_SECS", &mut self.gnews_limit.window_secs);
        override_num("GNEWS_MAX_ARTICLES", &mut self.gnews_max_articles);
        self
    }

    /// Clear placeholder keys and reset out-of-range numbers to defaults.
    pub fn sanitized(mut self) -> Self {
        self.news_api_key = clean_key(self.news_api_key.take());
        self.gnews_api_key = clean_key(self.gnews_api_key.take());

        if self.cache_ttl_secs == 0 {
            self.cache_ttl_secs = default_cache_ttl_secs();
        }
        if self.cache_max_entries == 0 {
            self.cache_max_entries = default_cache_max_entries();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.attempt_timeout_secs == 0 {
            self.attempt_timeout_secs = default_attempt_timeout_secs();
        }
        if !(1..=100).contains(&self.gnews_max_articles) {
            self.gnews_max_articles = default_gnews_max_articles();
        }
        self.newsapi_limit = self.newsapi_limit.sanitized(LimitConfig::newsapi_default());
        self.gnews_limit = self.gnews_limit.sanitized(LimitConfig::gnews_default());
        self
    }

    pub fn has_any_provider(&self) -> bool {
        self.news_api_key.is_some() || self.gnews_api_key.is_some()
    }
}

fn override_num<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = env::var(var) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!(var, "ignoring unparseable numeric override"),
        }
    }
}

fn clean_key(k: Option<String>) -> Option<String> {
    k.map(|s| s.trim().to_string()).filter(|s| {
        !s.is_empty() && !(s.starts_with("your_") && s.ends_with("_here"))
    })
}

/// "Present" / "Missing", never the key itself.
pub fn key_status(k: &Option<String>) -> &'static str {
    if k.is_some() {
        "Present"
    } else {
        "Missing"
    }
}
