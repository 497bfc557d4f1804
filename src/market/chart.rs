//! Historical chart handler.
//!
//! Builds the provider URL from caller parameters (normalizing the
//! `interval` code), calls the fetcher with a tight budget, and degrades to
//! generated candles when the upstream is unreachable.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use crate::cache::CacheKind;
use crate::config::Settings;
use crate::fetch::user_agent::ACCEPT_JSON;
use crate::fetch::{error_detail, FetchOptions, Fetcher};

use super::fallback;

/// Default number of candle rows when the caller does not say.
const DEFAULT_POINTSCOUNT: usize = 160;

fn time_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[MH]$").expect("valid regex"))
}

fn calendar_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[A-Z]$").expect("valid regex"))
}

/// Normalize an interval code for the provider.
///
/// Strips a leading `PT`, then re-prefixes `PT` for time units
/// (minutes/hours) and `P` for single-letter calendar units. Anything else
/// passes through, which makes the transform idempotent:
/// `PT15M -> PT15M`, `PT1H -> PT1H`, `PT1W -> P1W`, `P1W -> P1W`,
/// `15M -> PT15M`, `1W -> P1W`, `D1 -> D1`.
pub fn transform_interval(raw: &str) -> String {
    let body = raw.strip_prefix("PT").unwrap_or(raw);
    if time_unit_re().is_match(body) {
        format!("PT{}", body)
    } else if calendar_unit_re().is_match(body) {
        format!("P{}", body)
    } else {
        body.to_string()
    }
}

/// Build the upstream query, applying the interval transform. Sorted so the
/// cache key is deterministic regardless of caller parameter order.
fn upstream_params(params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            if k == "interval" {
                (k.clone(), transform_interval(v))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

fn encode_query(params: &BTreeMap<String, String>) -> String {
    let mut url = url::Url::parse("http://q/").expect("valid base");
    url.query_pairs_mut().extend_pairs(params.iter());
    url.query().unwrap_or_default().to_string()
}

/// Fetch chart data for an asset, falling back to generated candles.
pub async fn fetch_chart(
    fetcher: &Fetcher,
    settings: &Settings,
    asset_id: &str,
    params: &BTreeMap<String, String>,
) -> Value {
    let started = Instant::now();
    let upstream = upstream_params(params);
    let query = encode_query(&upstream);
    let url = format!(
        "{}/api/financialdata/{}/historical/chart?{}",
        settings.market_api_base, asset_id, query
    );
    let cache_params = format!("{}:{}", asset_id, query);
    let options = FetchOptions {
        cache: Some((CacheKind::Chart, cache_params)),
        timeout: Some(settings.chart_timeout),
        accept: Some(ACCEPT_JSON),
        referer: Some("https://www.investing.com/".to_string()),
        ..Default::default()
    };

    match fetcher.fetch(&url, &options, settings.chart_retries).await {
        Ok(fetched) => {
            let data = serde_json::from_str::<Value>(&fetched.body)
                .ok()
                .and_then(extract_rows);
            match data {
                Some(rows) => json!({
                    "success": true,
                    "source": if fetched.from_cache { "cache" } else { "live" },
                    "assetId": asset_id,
                    "data": rows,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "elapsed_ms": started.elapsed().as_millis() as u64,
                }),
                None => {
                    warn!("chart payload for asset {} unparseable, generating fallback", asset_id);
                    fallback_envelope(asset_id, params, started, None)
                }
            }
        }
        Err(err) => {
            warn!("chart fetch for asset {} failed ({}), generating fallback", asset_id, err);
            fallback_envelope(asset_id, params, started, Some(error_detail(&err)))
        }
    }
}

fn fallback_envelope(
    asset_id: &str,
    params: &BTreeMap<String, String>,
    started: Instant,
    error: Option<Value>,
) -> Value {
    let pointscount = params
        .get("pointscount")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POINTSCOUNT);
    let period = params.get("period").map(String::as_str).unwrap_or("P1W");
    let data = fallback::generate_candles(asset_id, pointscount, period);

    let mut body = json!({
        "success": true,
        "source": "fallback",
        "assetId": asset_id,
        "data": data,
        "note": "Using generated data - external API unavailable",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });
    if let Some(error) = error {
        body["error"] = error;
    }
    body
}

/// Chart rows from the provider arrive either bare or under `data`.
fn extract_rows(parsed: Value) -> Option<Vec<Value>> {
    match parsed {
        Value::Array(rows) => Some(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        },
        _ => None,
    }
}
