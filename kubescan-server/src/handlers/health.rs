use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.scans().store().ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unreachable");
            "unreachable".to_string()
        }
    };

    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status.is_success() { "healthy" } else { "degraded" },
            "database": database,
            "subscribers": state.hub().subscriber_count(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
