//! Deterministic fallback payloads.
//!
//! When live retrieval fails, handlers degrade to this data instead of
//! surfacing an error: static seed snapshots for equities and news, and a
//! generated candle series for charts. Candle generation is stochastic by
//! design; only the base price is derived from the asset id, so distinct
//! assets chart at different levels.

use rand::Rng;
use serde_json::{json, Value};

/// Seed equities snapshot (NGX large caps).
pub fn stock_seed() -> Vec<Value> {
    vec![
        json!({ "symbol": "DANGCEM", "name": "Dangote Cement Plc", "price": 320.70, "change": 5.30, "sector": "Industrial" }),
        json!({ "symbol": "MTNN", "name": "MTN Nigeria Communications Plc", "price": 214.90, "change": 3.40, "sector": "Telecommunications" }),
        json!({ "symbol": "GTCO", "name": "Guaranty Trust Holding Co. Plc", "price": 28.50, "change": 0.90, "sector": "Financial Services" }),
        json!({ "symbol": "ZENITHBANK", "name": "Zenith Bank Plc", "price": 25.85, "change": -0.45, "sector": "Financial Services" }),
        json!({ "symbol": "AIRTELAFRI", "name": "Airtel Africa Plc", "price": 1650.00, "change": 50.00, "sector": "Telecommunications" }),
        json!({ "symbol": "NESTLE", "name": "Nestle Nigeria Plc", "price": 910.20, "change": -10.80, "sector": "Consumer Goods" }),
        json!({ "symbol": "FBN", "name": "FBN Holdings Plc", "price": 12.45, "change": 0.35, "sector": "Financial Services" }),
        json!({ "symbol": "BUACEMENT", "name": "BUA Cement Plc", "price": 95.80, "change": 2.30, "sector": "Industrial" }),
        json!({ "symbol": "SEPLAT", "name": "Seplat Energy Plc", "price": 1200.00, "change": -15.50, "sector": "Oil & Gas" }),
        json!({ "symbol": "ACCESSCORP", "name": "Access Holdings Plc", "price": 15.90, "change": 0.65, "sector": "Financial Services" }),
    ]
}

/// Seed news articles.
pub fn news_seed() -> Vec<Value> {
    vec![
        json!({
            "title": "Weekly Market Wrap: Premium stocks lead rally as All-Share Index hits N72 trillion cap, banking sector shines",
            "link": "https://nairametrics.com/2025/06/08/weekly-market-wrap-premium-stocks-lead-rally-as-all-share-index-hits-n72-trillion-cap-banking-sector-shines/",
            "date": "June 8, 2025",
            "category": "Equities",
            "author": "Izuchukwu Okoye",
            "source": "Nairametrics"
        }),
        json!({
            "title": "Nigerian Stock Market hits new record as June rally pops",
            "link": "https://nairametrics.com/2025/06/07/nigerian-stock-market-hits-new-record-as-june-rally-pops/",
            "date": "June 7, 2025",
            "category": "Equities",
            "author": "Unknown Author",
            "source": "Nairametrics"
        }),
        json!({
            "title": "NGX Chairman Umaru Kwairanga eyes Dangote Petrochemicals, NNPC listings in 2025",
            "link": "https://nairametrics.com/2025/06/07/ngx-chairman-umaru-kwairanga-eyes-dangote-petrochemicals-nnpc-listings-in-2025/",
            "date": "June 7, 2025",
            "category": "Energy",
            "author": "Unknown Author",
            "source": "Nairametrics"
        }),
        json!({
            "title": "Dangote Petrochemicals listing on NGX to strengthen Nigeria's stock market",
            "link": "https://nairametrics.com/2025/06/07/dangote-petrochemicals-listing-on-ngx-to-strengthen-nigerias-stock-market-chairman-kwairanga/",
            "date": "June 7, 2025",
            "category": "Energy",
            "author": "Unknown Author",
            "source": "Nairametrics"
        }),
    ]
}

/// Generate a synthetic candle series shaped like the upstream chart rows:
/// `[timestamp_ms, open, high, low, close, volume]`, oldest first.
pub fn generate_candles(asset_id: &str, pointscount: usize, period: &str) -> Vec<Value> {
    let mut rng = rand::rng();

    // Base price keyed off the asset id so different assets differ.
    let id_num: u64 = asset_id
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let mut price = 50.0 + (id_num % 950) as f64;

    // Coarser periods step a day, everything else steps an hour.
    let step_ms: i64 = match period {
        "P1Y" | "P5Y" | "MAX" => 24 * 60 * 60 * 1000,
        _ => 60 * 60 * 1000,
    };

    let now = chrono::Utc::now().timestamp_millis();
    let mut candles = Vec::with_capacity(pointscount);

    for i in 0..pointscount {
        let open = price;
        let change = (rng.random::<f64>() - 0.5) * price * 0.02;
        price = (price + change).max(price * 0.8);
        let high = price.max(open) + rng.random::<f64>() * price * 0.01;
        let low = price.min(open) - rng.random::<f64>() * price * 0.01;
        let volume: u64 = rng.random_range(0..10_000);

        candles.push(json!([
            now - ((pointscount - i) as i64) * step_ms,
            format!("{:.2}", open),
            format!("{:.2}", high),
            format!("{:.2}", low),
            format!("{:.2}", price),
            volume
        ]));
    }

    candles
}
