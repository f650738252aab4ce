//! Health and metrics endpoints.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::error;

use crate::state::ApiState;

/// `GET /health`: liveness probe, exempt from rate limiting.
pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

/// `GET /metrics`: Prometheus text exposition.
pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(rendered) => (StatusCode::OK, rendered),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
