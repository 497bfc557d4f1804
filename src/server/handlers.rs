//! HTTP route handlers.
//!
//! Handlers never surface fetch failures as errors: the resource layer
//! degrades to fallback payloads, so everything here is `200` except input
//! validation (`400`) and admission rejection (`429`).

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::cache::CacheKind;
use crate::fetch::user_agent::ACCEPT_JSON;
use crate::fetch::FetchOptions;
use crate::market;

use super::AppState;

/// `assetId` must be purely numeric (`^\d+$`).
fn is_valid_asset_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

fn invalid_asset_id() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "Invalid asset ID. Must be a numeric value.",
            "example": "/chart-data/101672?interval=PT15M&pointscount=160",
        })),
    )
        .into_response()
}

/// GET /nigeria-stocks
pub async fn nigeria_stocks(State(state): State<AppState>) -> Json<Value> {
    Json(market::stocks::fetch_stocks(&state.fetcher, &state.settings).await)
}

/// GET /nigeria-news
pub async fn nigeria_news(State(state): State<AppState>) -> Json<Value> {
    Json(market::news::fetch_news(&state.fetcher, &state.settings).await)
}

/// GET /chart-data/:asset_id
pub async fn chart_data(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    if !is_valid_asset_id(&asset_id) {
        return invalid_asset_id();
    }
    let body =
        market::chart::fetch_chart(&state.fetcher, &state.settings, &asset_id, &params).await;
    Json(body).into_response()
}

/// POST /chart-data with parameters in the JSON body.
pub async fn chart_data_post(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(map) = body.as_object() else {
        return invalid_asset_id();
    };
    let asset_id = match map.get("assetId") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return invalid_asset_id(),
    };
    if !is_valid_asset_id(&asset_id) {
        return invalid_asset_id();
    }

    let params: BTreeMap<String, String> = map
        .iter()
        .filter(|(k, _)| k.as_str() != "assetId")
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();

    let body =
        market::chart::fetch_chart(&state.fetcher, &state.settings, &asset_id, &params).await;
    Json(body).into_response()
}

/// GET /health — liveness plus resource counts, cached briefly.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    if let Some(cached) = state.cache.get(CacheKind::Health, "") {
        if let Ok(body) = serde_json::from_str(&cached) {
            return Json(body);
        }
    }

    let body = json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "sessions": state.pool.size(),
        "cache_entries": state.cache.entry_count(),
        "active_requests": state.gate.active(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    });
    state.cache.put(CacheKind::Health, body.to_string(), "");
    Json(body)
}

/// GET /status — session, rate-limit, and request diagnostics.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "sessions": state.pool.stats(),
        "rate_limit_counters": state.limiter.counter_count(),
        "active_requests": state.gate.active(),
        "max_concurrent_requests": state.gate.ceiling(),
        "cache_entries": state.cache.entry_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /test-api/:endpoint — manual upstream probe, no cache.
pub async fn test_api(State(state): State<AppState>, Path(endpoint): Path<String>) -> Response {
    let url = match endpoint.as_str() {
        "stocks" => format!(
            "{}/api/financialdata/assets/equitiesByCountry/default?country-id=20&page=0&page-size=10",
            state.settings.market_api_base
        ),
        "chart" => format!(
            "{}/api/financialdata/101672/historical/chart?interval=PT15M&pointscount=10",
            state.settings.market_api_base
        ),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Unknown endpoint",
                    "available": ["stocks", "chart"],
                })),
            )
                .into_response();
        }
    };

    let started = std::time::Instant::now();
    let options = FetchOptions {
        timeout: Some(state.settings.stocks_timeout),
        accept: Some(ACCEPT_JSON),
        referer: Some("https://www.investing.com/".to_string()),
        ..Default::default()
    };
    let body = match state.fetcher.fetch(&url, &options, 1).await {
        Ok(fetched) => json!({
            "endpoint": endpoint,
            "ok": true,
            "elapsed_ms": started.elapsed().as_millis() as u64,
            "body_length": fetched.body.len(),
        }),
        Err(err) => json!({
            "endpoint": endpoint,
            "ok": false,
            "elapsed_ms": started.elapsed().as_millis() as u64,
            "error": crate::fetch::error_detail(&err),
        }),
    };
    Json(body).into_response()
}
