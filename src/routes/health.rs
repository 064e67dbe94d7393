use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub hostname: String,
}

/// Liveness and readiness check; healthy exactly when the store answers a ping.
pub async fn health(State(state): State<AppState>) -> Response {
    if let Err(e) = state.store.ping().await {
        warn!(error = %e, "health check: database ping failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": "database ping failed",
            })),
        )
            .into_response();
    }

    Json(HealthResponse {
        status: "healthy",
        service: state.config.service_name.clone(),
        time: OffsetDateTime::now_utc(),
        hostname: state.hostname.to_string(),
    })
    .into_response()
}
