//! Equities snapshot handler.

use std::time::Instant;

use serde_json::{json, Value};
use tracing::warn;

use crate::cache::CacheKind;
use crate::config::Settings;
use crate::fetch::user_agent::ACCEPT_JSON;
use crate::fetch::{error_detail, FetchOptions, Fetcher};

use super::{envelope, fallback};

/// Upstream path for the Nigerian equities snapshot (country-id 20).
const STOCKS_PATH: &str =
    "/api/financialdata/assets/equitiesByCountry/default?country-id=20&page=0&page-size=100";

/// Fetch the equities snapshot, falling back to seed data. Never fails.
pub async fn fetch_stocks(fetcher: &Fetcher, settings: &Settings) -> Value {
    let started = Instant::now();
    let url = format!("{}{}", settings.market_api_base, STOCKS_PATH);
    let options = FetchOptions {
        cache: Some((CacheKind::Stocks, "default".to_string())),
        timeout: Some(settings.stocks_timeout),
        accept: Some(ACCEPT_JSON),
        referer: Some("https://www.investing.com/".to_string()),
        ..Default::default()
    };

    match fetcher.fetch(&url, &options, settings.stocks_retries).await {
        Ok(fetched) => match shape_stocks(&fetched.body) {
            Some(data) => envelope(
                if fetched.from_cache { "cache" } else { "live" },
                data,
                started,
                None,
            ),
            None => {
                warn!("stocks payload from upstream was not parseable, serving fallback");
                envelope(
                    "fallback",
                    fallback::stock_seed(),
                    started,
                    Some(json!("Upstream payload unparseable")),
                )
            }
        },
        Err(err) => {
            warn!("stocks fetch failed ({}), serving fallback", err);
            let mut body = envelope(
                "fallback",
                fallback::stock_seed(),
                started,
                Some(json!("Using seed data - upstream unavailable")),
            );
            body["error"] = error_detail(&err);
            body
        }
    }
}

/// Pull the rows out of the provider's JSON. The provider wraps rows in a
/// `data` array; tolerate a bare array too.
fn shape_stocks(body: &str) -> Option<Vec<Value>> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    match parsed {
        Value::Array(rows) => Some(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
        },
        _ => None,
    }
}
