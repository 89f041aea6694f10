//! Notification ingress and health endpoints.
//!
//! The external watch adapter POSTs lifecycle notifications here. Malformed
//! bodies are rejected with 400 and dropped; a store failure answers 503 —
//! the notification is logged and dropped, and the next delivery retries
//! naturally against current state.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/v1/notifications` | Ingest one lifecycle notification |
//! | GET | `/v1/records` | List tracked rollout records |
//! | GET | `/healthz` | Liveness (returns the current timestamp) |
//! | GET | `/readyz` | Readiness (probes the record store) |

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tracing::warn;

use rollsettle_reducer::{EventReducer, PodNotification, ReduceError};
use rollsettle_state::RecordStore;

/// Shared state for ingress handlers.
#[derive(Clone)]
pub struct IngressState {
    pub store: RecordStore,
    pub reducer: EventReducer,
}

/// Build the ingress router.
pub fn build_router(state: IngressState) -> Router {
    Router::new()
        .route("/v1/notifications", post(ingest_notification))
        .route("/v1/records", get(list_records))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// POST /v1/notifications
async fn ingest_notification(
    State(state): State<IngressState>,
    body: Bytes,
) -> impl IntoResponse {
    let notification = match PodNotification::parse(&body) {
        Ok(notification) => notification,
        Err(e) => {
            warn!(error = %e, "dropping malformed notification");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            );
        }
    };

    match state.reducer.apply(&notification) {
        Ok(record) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "identity": notification.identity,
                "folded": record.is_some(),
            })),
        ),
        Err(ReduceError::Malformed(msg)) => {
            warn!(error = %msg, "dropping malformed notification");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": msg})),
            )
        }
        Err(ReduceError::Store(e)) => {
            // Degraded storage: the notification is dropped, not queued.
            warn!(error = %e, "store rejected notification fold, dropping");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

/// GET /v1/records
async fn list_records(State(state): State<IngressState>) -> impl IntoResponse {
    match state.store.list_all() {
        Ok(records) => (StatusCode::OK, Json(serde_json::json!(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// GET /healthz
async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "now": epoch_secs(),
    }))
}

/// GET /readyz
async fn readyz(State(state): State<IngressState>) -> impl IntoResponse {
    match state.store.count() {
        Ok(records) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "records": records})),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unavailable", "error": e.to_string()})),
        ),
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
