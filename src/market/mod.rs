//! Resource handlers: thin orchestration between the HTTP surface and the
//! resilient fetcher, each with a deterministic fallback.

pub mod chart;
pub mod fallback;
pub mod news;
pub mod stocks;

use std::time::Instant;

use serde_json::{json, Value};

/// Public JSON envelope shared by the stocks and news handlers.
///
/// `source` is `live`, `cache`, or `fallback`; fallback responses still
/// report `success: true` because degraded data is a first-class outcome.
pub fn envelope(source: &str, data: Vec<Value>, started: Instant, note: Option<Value>) -> Value {
    let mut body = json!({
        "success": true,
        "source": source,
        "count": data.len(),
        "data": data,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });
    if let Some(note) = note {
        body["note"] = note;
    }
    body
}
