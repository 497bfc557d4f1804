//! Inbound concurrency ceiling.
//!
//! A process-wide counter of requests currently being handled. New requests
//! past the ceiling are rejected immediately, never queued. The permit is
//! RAII so the counter is decremented exactly once whether the response
//! completes normally or the client disconnects and the handler future is
//! dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use super::AppState;

pub struct AdmissionGate {
    ceiling: usize,
    active: AtomicUsize,
}

impl AdmissionGate {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            active: AtomicUsize::new(0),
        }
    }

    /// Admit one request, or refuse if the ceiling is reached.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.ceiling {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(AdmissionPermit {
                        gate: Arc::clone(self),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// Held for the lifetime of an admitted request.
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Middleware applying the gate to every inbound request.
pub async fn admit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.gate.try_admit() {
        Some(_permit) => next.run(request).await,
        None => {
            warn!(
                "admission gate full ({} active), rejecting request",
                state.gate.active()
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Too many concurrent requests",
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}
