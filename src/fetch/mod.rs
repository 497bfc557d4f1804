//! Resilient upstream fetcher.
//!
//! Orchestrates cache lookup, local rate limiting, session leasing, the
//! HTTP call with anti-detection headers, and retry with exponential
//! backoff. The retry loop works over typed attempt outcomes so the
//! 403 fast-path and the 401/404 fatal path stay independently testable.

pub mod user_agent;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheKind, ResponseCache};
use crate::error::{truncate_message, FetchError};
use crate::rate_limit::RateLimiter;
use crate::sessions::{Session, SessionPool};
use user_agent::{browser_headers, ACCEPT_HTML};

/// Body substrings that indicate a bot challenge instead of real data.
const BOT_CHALLENGE_MARKERS: &[&str] = &["Just a moment...", "challenge-platform", "cf-mitigated"];

/// Growth factor for the backoff delay between attempts.
const BACKOFF_FACTOR: f64 = 1.2;

/// Upper bound on the random jitter added to each backoff delay.
const JITTER_MS: u64 = 100;

/// Per-request options for a fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Cache the response under this resource type and parameter string.
    pub cache: Option<(CacheKind, String)>,
    /// Identifier used for rate limiting. A random one is generated when
    /// absent. Not used for session selection.
    pub session_id: Option<String>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Accept header; defaults to a browser HTML accept.
    pub accept: Option<&'static str>,
    /// Referer appropriate to the upstream.
    pub referer: Option<String>,
}

/// A successful fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    pub from_cache: bool,
}

/// Outcome of a single attempt inside the retry loop.
enum Attempt {
    Success(String),
    Retry(FetchError),
    Fatal(FetchError),
}

/// Fetcher wired to the shared pool, cache, and limiter.
pub struct Fetcher {
    pool: Arc<SessionPool>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl Fetcher {
    pub fn new(
        pool: Arc<SessionPool>,
        cache: Arc<ResponseCache>,
        limiter: Arc<RateLimiter>,
        base_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            limiter,
            base_backoff,
            max_backoff,
        }
    }

    /// Fetch a URL with caching, rate limiting, and retries.
    pub async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        max_retries: u32,
    ) -> Result<Fetched, FetchError> {
        let identifier = options
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some((kind, params)) = &options.cache {
            if let Some(body) = self.cache.get(*kind, params) {
                return Ok(Fetched {
                    body,
                    from_cache: true,
                });
            }
        }

        if !self.limiter.allow(&identifier) {
            return Err(FetchError::RateLimited);
        }

        let mut last_error = FetchError::EmptyBody;
        let mut skip_delay = false;

        for attempt in 1..=max_retries.max(1) {
            let session = self.pool.lease();

            if attempt > 1 && !skip_delay {
                let delay = self.backoff_delay(attempt);
                debug!("attempt {} for {}, backing off {:?}", attempt, url, delay);
                tokio::time::sleep(delay).await;
            }
            skip_delay = false;

            let outcome = self.attempt(url, &session, options).await;
            self.pool.release(&session.id);

            match outcome {
                Attempt::Success(body) => {
                    if let Some((kind, params)) = &options.cache {
                        self.cache.put(*kind, body.clone(), params);
                    }
                    return Ok(Fetched {
                        body,
                        from_cache: false,
                    });
                }
                Attempt::Fatal(err) => {
                    warn!("fetch of {} failed permanently: {}", url, err);
                    return Err(err);
                }
                Attempt::Retry(err) => {
                    // A 403 suggests the block is identity-based, so swap
                    // sessions immediately instead of waiting.
                    skip_delay = err.is_identity_block();
                    warn!("attempt {} for {} failed: {}", attempt, url, err);
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    /// One HTTP attempt with a leased session.
    async fn attempt(&self, url: &str, session: &Session, options: &FetchOptions) -> Attempt {
        let mut request = session
            .client
            .get(url)
            .header("Accept", options.accept.unwrap_or(ACCEPT_HTML));

        for (name, value) in browser_headers() {
            request = request.header(name, value);
        }
        if let Some(referer) = &options.referer {
            request = request.header("Referer", referer.clone());
            request = request.header("Origin", referer.trim_end_matches('/').to_string());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return Attempt::Retry(FetchError::Timeout),
            Err(err) => return Attempt::Retry(FetchError::Transport(err)),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) if err.is_timeout() => return Attempt::Retry(FetchError::Timeout),
            Err(err) => return Attempt::Retry(FetchError::Transport(err)),
        };

        if !(200..300).contains(&status) {
            let err = FetchError::upstream(status, &body);
            return if err.is_fatal() {
                Attempt::Fatal(err)
            } else {
                Attempt::Retry(err)
            };
        }

        if body.trim().is_empty() {
            return Attempt::Retry(FetchError::EmptyBody);
        }
        if BOT_CHALLENGE_MARKERS.iter().any(|m| body.contains(m)) {
            debug!("bot challenge marker in body from {}", url);
            return Attempt::Retry(FetchError::BotChallenge);
        }

        Attempt::Success(body)
    }

    /// Exponential backoff with jitter, capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_backoff.as_millis() as f64;
        let scaled = base * BACKOFF_FACTOR.powi(attempt as i32 - 1);
        let jitter = rand::rng().random_range(0..JITTER_MS) as f64;
        let delay = Duration::from_millis((scaled + jitter) as u64);
        delay.min(self.max_backoff)
    }
}

/// Shorthand for surfacing a fetch error in diagnostics JSON.
pub fn error_detail(err: &FetchError) -> serde_json::Value {
    serde_json::json!({
        "status": err.status(),
        "message": truncate_message(&err.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;

    fn fetcher_with(window_max: u32) -> Fetcher {
        let pool = Arc::new(SessionPool::new(4, Duration::from_secs(600)));
        let cache = Arc::new(ResponseCache::new(
            Box::new(InMemoryStore::new(10)),
            Box::new(|_| Duration::from_secs(60)),
        ));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(30), window_max));
        Fetcher::new(
            pool,
            cache,
            limiter,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
    }

    fn fetcher() -> Fetcher {
        fetcher_with(100)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data")
            .with_status(200)
            .with_body("{\"ok\":true}")
            .expect(1)
            .create_async()
            .await;

        let result = fetcher()
            .fetch(&format!("{}/data", server.url()), &FetchOptions::default(), 3)
            .await
            .unwrap();
        assert!(!result.from_cache);
        assert!(result.body.contains("ok"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_exhaustion_preserves_last_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(500)
            .with_body("internal error")
            .expect(3)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(
                &format!("{}/flaky", server.url()),
                &FetchOptions::default(),
                3,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("internal error"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_404_terminates_on_first_attempt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not found")
            .expect(1)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(
                &format!("{}/missing", server.url()),
                &FetchOptions::default(),
                5,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_terminates_on_first_attempt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/denied")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(
                &format!("{}/denied", server.url()),
                &FetchOptions::default(),
                5,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_403_fast_path_skips_backoff() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/blocked")
            .with_status(403)
            .expect(4)
            .create_async()
            .await;

        // With a large base backoff, four attempts only finish quickly if
        // every 403 skips the delay.
        let pool = Arc::new(SessionPool::new(4, Duration::from_secs(600)));
        let cache = Arc::new(ResponseCache::new(
            Box::new(InMemoryStore::new(10)),
            Box::new(|_| Duration::from_secs(60)),
        ));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(30), 100));
        let fetcher = Fetcher::new(
            pool,
            cache,
            limiter,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        let start = std::time::Instant::now();
        let err = fetcher
            .fetch(
                &format!("{}/blocked", server.url()),
                &FetchOptions::default(),
                4,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(start.elapsed() < Duration::from_secs(2));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bot_challenge_body_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("<html>Just a moment...</html>")
            .expect(2)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(
                &format!("{}/page", server.url()),
                &FetchOptions::default(),
                2,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BotChallenge));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_body_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/empty")
            .with_status(200)
            .with_body("  ")
            .expect(2)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(
                &format!("{}/empty", server.url()),
                &FetchOptions::default(),
                2,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/cached")
            .with_status(200)
            .with_body("payload")
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher();
        let options = FetchOptions {
            cache: Some((CacheKind::Stocks, "default".to_string())),
            ..Default::default()
        };
        let url = format!("{}/cached", server.url());

        let first = fetcher.fetch(&url, &options, 3).await.unwrap();
        assert!(!first.from_cache);
        let second = fetcher.fetch(&url, &options, 3).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, "payload");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_fails_fast_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/limited")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher_with(1);
        let options = FetchOptions {
            session_id: Some("fixed-client".to_string()),
            ..Default::default()
        };
        let url = format!("{}/limited", server.url());

        fetcher.fetch(&url, &options, 3).await.unwrap();
        let err = fetcher.fetch(&url, &options, 3).await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sessions_released_after_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/flaky")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let pool = Arc::new(SessionPool::new(4, Duration::from_secs(600)));
        let cache = Arc::new(ResponseCache::new(
            Box::new(InMemoryStore::new(10)),
            Box::new(|_| Duration::from_secs(60)),
        ));
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(30), 100));
        let fetcher = Fetcher::new(
            pool.clone(),
            cache,
            limiter,
            Duration::from_millis(10),
            Duration::from_millis(50),
        );

        let _ = fetcher
            .fetch(
                &format!("{}/flaky", server.url()),
                &FetchOptions::default(),
                3,
            )
            .await;
        assert!(pool.stats().iter().all(|s| s.available));
    }
}
