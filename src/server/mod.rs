//! HTTP server wiring: shared state, background sweep, graceful shutdown.

mod admission;
mod handlers;
mod routes;

pub use admission::AdmissionGate;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::cache::{InMemoryStore, ResponseCache};
use crate::config::Settings;
use crate::fetch::Fetcher;
use crate::rate_limit::RateLimiter;
use crate::sessions::SessionPool;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool: Arc<SessionPool>,
    pub cache: Arc<ResponseCache>,
    pub limiter: Arc<RateLimiter>,
    pub fetcher: Arc<Fetcher>,
    pub gate: Arc<AdmissionGate>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let pool = Arc::new(SessionPool::new(
            settings.max_sessions,
            settings.session_ttl,
        ));
        let ttl_settings = settings.clone();
        let cache = Arc::new(ResponseCache::new(
            Box::new(InMemoryStore::new(settings.cache_max_entries)),
            Box::new(move |kind| ttl_settings.ttl_for(kind)),
        ));
        let limiter = Arc::new(RateLimiter::new(
            settings.rate_window,
            settings.rate_max_per_window,
        ));
        let fetcher = Arc::new(Fetcher::new(
            Arc::clone(&pool),
            Arc::clone(&cache),
            Arc::clone(&limiter),
            settings.base_backoff,
            settings.max_backoff,
        ));
        let gate = Arc::new(AdmissionGate::new(settings.max_concurrent_requests));

        Self {
            settings: Arc::new(settings),
            pool,
            cache,
            limiter,
            fetcher,
            gate,
            started_at: Instant::now(),
        }
    }
}

/// Start the server and block until a termination signal drains it.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let state = AppState::new(settings);

    // Background sweep: rotate expired sessions, drop stale rate counters.
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_state.settings.sweep_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            sweep_state.pool.sweep();
            sweep_state.limiter.sweep();
        }
    });

    let app = create_router(state);
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server drained, exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    /// Settings pointing at a closed port so every upstream call fails fast.
    fn offline_settings() -> Settings {
        Settings {
            market_api_base: "http://127.0.0.1:9".to_string(),
            news_url: "http://127.0.0.1:9/news".to_string(),
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            stocks_timeout: Duration::from_millis(500),
            chart_timeout: Duration::from_millis(500),
            news_timeout: Duration::from_millis(500),
            news_outer_timeout: Duration::from_secs(2),
            stocks_retries: 2,
            chart_retries: 2,
            news_retries: 2,
            ..Settings::default()
        }
    }

    fn offline_app() -> axum::Router {
        create_router(AppState::new(offline_settings()))
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = get_json(offline_app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["sessions"].is_u64());
        assert!(json["active_requests"].is_u64());
    }

    #[tokio::test]
    async fn test_status_diagnostics() {
        let (status, json) = get_json(offline_app(), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["sessions"].is_array());
        assert!(json["rate_limit_counters"].is_u64());
        assert_eq!(json["max_concurrent_requests"], 50);
    }

    #[tokio::test]
    async fn test_stocks_fallback_when_upstream_unreachable() {
        let (status, json) = get_json(offline_app(), "/nigeria-stocks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["count"], 10);
        assert_eq!(json["data"][0]["symbol"], "DANGCEM");
    }

    #[tokio::test]
    async fn test_news_fallback_when_upstream_unreachable() {
        let (status, json) = get_json(offline_app(), "/nigeria-news").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["source"], "fallback");
        assert!(json["count"].as_u64().unwrap() > 0);
        assert!(json["data"][0]["link"].is_string());
    }

    #[tokio::test]
    async fn test_chart_fallback_generates_requested_points() {
        let (status, json) = get_json(
            offline_app(),
            "/chart-data/101672?interval=PT15M&pointscount=10",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["assetId"], "101672");
        assert_eq!(json["data"].as_array().unwrap().len(), 10);
        let row = json["data"][0].as_array().unwrap();
        assert_eq!(row.len(), 6);
    }

    #[tokio::test]
    async fn test_chart_rejects_bad_asset_id() {
        let (status, json) = get_json(offline_app(), "/chart-data/notanumber").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("asset ID"));
        assert!(json["example"].is_string());
    }

    #[tokio::test]
    async fn test_chart_post_requires_asset_id() {
        let app = offline_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chart-data")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"interval":"PT15M"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chart_post_fallback() {
        let app = offline_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chart-data")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"assetId":"101672","pointscount":5,"period":"P1W"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["data"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_test_api_unknown_endpoint() {
        let (status, json) = get_json(offline_app(), "/test-api/bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["available"].is_array());
    }

    #[tokio::test]
    async fn test_test_api_reports_probe_failure() {
        let (status, json) = get_json(offline_app(), "/test-api/stocks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], false);
        assert!(json["error"].is_object());
    }

    #[tokio::test]
    async fn test_admission_gate_rejects_when_full() {
        let settings = Settings {
            max_concurrent_requests: 0,
            ..offline_settings()
        };
        let app = create_router(AppState::new(settings));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_stocks_fallback_is_cached_separately_from_live() {
        // Two consecutive requests both degrade; fallback data is not
        // written to the cache, so the second request reports fallback too.
        let app = offline_app();
        let (_, first) = get_json(app.clone(), "/nigeria-stocks").await;
        let (_, second) = get_json(app, "/nigeria-stocks").await;
        assert_eq!(first["source"], "fallback");
        assert_eq!(second["source"], "fallback");
    }
}
