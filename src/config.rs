//! Service configuration.
//!
//! Every tunable has a sensible default and can be overridden through the
//! environment (`NGX_PROXY_*`), which is how the deployment sets timeouts
//! and limits without a config file.

use std::time::Duration;

use crate::cache::CacheKind;

/// Default session TTL (10 minutes).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 600;

/// Default cap on simulated client identities.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Default rate limit window (30 seconds).
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 30;

/// Default requests allowed per identifier per window.
pub const DEFAULT_RATE_MAX_PER_WINDOW: u32 = 20;

/// Default cap on cached responses.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;

/// Default ceiling on concurrently handled inbound requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Runtime settings for the proxy.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,

    /// Base URL of the financial data provider.
    pub market_api_base: String,
    /// URL of the scraped news category page.
    pub news_url: String,

    /// Session pool cap and identity TTL.
    pub max_sessions: usize,
    pub session_ttl: Duration,

    /// Local rate limiter window and per-window budget.
    pub rate_window: Duration,
    pub rate_max_per_window: u32,

    /// Response cache cap and per-resource TTLs.
    pub cache_max_entries: usize,
    pub stocks_ttl: Duration,
    pub chart_ttl: Duration,
    pub news_ttl: Duration,
    pub health_ttl: Duration,

    /// Inbound concurrency ceiling.
    pub max_concurrent_requests: usize,

    /// Retry backoff bounds for the resilient fetcher.
    pub base_backoff: Duration,
    pub max_backoff: Duration,

    /// Per-resource upstream timeouts and retry budgets. These are tight
    /// because the caller is latency-sensitive and every path has a fallback.
    pub stocks_timeout: Duration,
    pub chart_timeout: Duration,
    pub news_timeout: Duration,
    /// Outer ceiling raced against the whole news scrape.
    pub news_outer_timeout: Duration,
    pub stocks_retries: u32,
    pub chart_retries: u32,
    pub news_retries: u32,

    /// Interval of the background sweep (sessions + rate counters).
    pub sweep_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            market_api_base: "https://api.investing.com".to_string(),
            news_url:
                "https://nairametrics.com/category/market-news/equities/nigerian-stock-exchange-market/"
                    .to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
            rate_max_per_window: DEFAULT_RATE_MAX_PER_WINDOW,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            stocks_ttl: Duration::from_secs(60),
            chart_ttl: Duration::from_secs(120),
            news_ttl: Duration::from_secs(3 * 60 * 60),
            health_ttl: Duration::from_secs(30),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            base_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(5),
            stocks_timeout: Duration::from_secs(8),
            chart_timeout: Duration::from_secs(8),
            news_timeout: Duration::from_secs(15),
            news_outer_timeout: Duration::from_secs(20),
            stocks_retries: 2,
            chart_retries: 2,
            news_retries: 2,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Settings {
    /// Load settings, applying `NGX_PROXY_*` environment overrides.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(v) = env_string("NGX_PROXY_MARKET_API_BASE") {
            settings.market_api_base = v;
        }
        if let Some(v) = env_string("NGX_PROXY_NEWS_URL") {
            settings.news_url = v;
        }
        if let Some(v) = env_parse("NGX_PROXY_MAX_SESSIONS") {
            settings.max_sessions = v;
        }
        if let Some(v) = env_parse("NGX_PROXY_SESSION_TTL_SECS") {
            settings.session_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("NGX_PROXY_RATE_WINDOW_SECS") {
            settings.rate_window = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("NGX_PROXY_RATE_MAX_PER_WINDOW") {
            settings.rate_max_per_window = v;
        }
        if let Some(v) = env_parse("NGX_PROXY_CACHE_MAX_ENTRIES") {
            settings.cache_max_entries = v;
        }
        if let Some(v) = env_parse("NGX_PROXY_STOCKS_TTL_SECS") {
            settings.stocks_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("NGX_PROXY_CHART_TTL_SECS") {
            settings.chart_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("NGX_PROXY_NEWS_TTL_SECS") {
            settings.news_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("NGX_PROXY_MAX_CONCURRENT") {
            settings.max_concurrent_requests = v;
        }

        settings
    }

    /// Cache TTL for a logical resource type.
    pub fn ttl_for(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Stocks => self.stocks_ttl,
            CacheKind::Chart => self.chart_ttl,
            CacheKind::News => self.news_ttl,
            CacheKind::Health => self.health_ttl,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
