use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Lets a reverse proxy's 502/503/504 interception be triggered on demand.
pub async fn error_page(Path(code): Path<String>) -> Response {
    match code.as_str() {
        "502" => StatusCode::BAD_GATEWAY.into_response(),
        "503" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "504" => StatusCode::GATEWAY_TIMEOUT.into_response(),
        _ => Json(json!({ "usage": "/error/{502,503,504}" })).into_response(),
    }
}
