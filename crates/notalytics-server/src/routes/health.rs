use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health` - liveness check.
///
/// 200 when the event store answers a ping, 503 otherwise. The body also
/// reports the latest started pass id.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let latest_pass = state.passes.latest();
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "latest_pass": latest_pass
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check: event store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "version": env!("CARGO_PKG_VERSION"),
                    "latest_pass": latest_pass
                })),
            )
                .into_response()
        }
    }
}
