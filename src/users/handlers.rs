use axum::{extract::State, routing::get, Json, Router};
use tracing::{error, info, instrument};

use crate::{
    error::ApiError,
    state::AppState,
    users::{dto::VisitResponse, repo_types::NewUser},
};

pub fn visit_routes() -> Router<AppState> {
    Router::new().route("/", get(visit))
}

/// Creates one user per call and returns the whole table.
#[instrument(skip(state))]
pub async fn visit(State(state): State<AppState>) -> Result<Json<VisitResponse>, ApiError> {
    let candidate = match NewUser::new(state.names.next_name(), state.emails.next_email()) {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "generated user rejected");
            return Err(ApiError::internal("Failed to create user"));
        }
    };

    let new_user = match state.store.insert(&candidate).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, email = candidate.email(), "create user failed");
            return Err(ApiError::internal("Failed to create user"));
        }
    };

    let all_users = match state.store.list_active().await {
        Ok(users) => users,
        Err(e) => {
            error!(error = %e, "list users failed");
            return Err(ApiError::internal("Failed to fetch users"));
        }
    };

    info!(user_id = new_user.id, total = all_users.len(), "user created on visit");
    Ok(Json(VisitResponse {
        hostname: state.hostname.to_string(),
        message: "User created on this visit!",
        new_user,
        total_users: all_users.len(),
        all_users,
    }))
}
