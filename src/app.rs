use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::routes::{error_pages::error_page, health::health};
use crate::state::AppState;
use crate::users;

/// Route table plus the request wrappers applied to every route.
///
/// Layers run outermost first: tracing, then panic recovery, then the handler.
pub fn build_app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .merge(users::router());

    if state.config.error_routes {
        router = router.route("/error/:code", get(error_page));
    }

    router
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};
    use tower::ServiceExt;

    use crate::users::{
        repo::{SqliteUserStore, StoreError, UserStore},
        repo_types::{NewUser, User},
    };

    /// Store whose reads always fail.
    struct ListFails(SqliteUserStore);

    #[async_trait]
    impl UserStore for ListFails {
        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
        async fn ensure_schema(&self) -> Result<(), StoreError> {
            self.0.ensure_schema().await
        }
        async fn insert(&self, user: &NewUser) -> Result<User, StoreError> {
            self.0.insert(user).await
        }
        async fn list_active(&self) -> Result<Vec<User>, StoreError> {
            Err(StoreError::Query(sqlx::Error::PoolClosed))
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_healthy_store() {
        let (state, _store, _dir) = AppState::fake().await;
        let (status, json) = get_json(build_app(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "nvoi-example-app");
        assert_eq!(json["hostname"], "test-host");
        let stamp = json["time"].as_str().unwrap();
        assert!(OffsetDateTime::parse(stamp, &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn health_reports_unavailable_when_store_is_closed() {
        let (state, store, _dir) = AppState::fake().await;
        store.pool().close().await;
        let (status, json) = get_json(build_app(state), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["error"], "database ping failed");
    }

    #[tokio::test]
    async fn visit_creates_a_user_and_lists_everyone() {
        let (state, _store, _dir) = AppState::fake().await;
        let app = build_app(state);

        let (status, first) = get_json(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["message"], "User created on this visit!");
        assert_eq!(first["hostname"], "test-host");
        assert_eq!(first["total_users"], 1);
        assert_eq!(first["all_users"][0], first["new_user"]);
        assert!(first["new_user"].get("deleted_at").is_none());
        let email = first["new_user"]["email"].as_str().unwrap();
        assert!(email.starts_with("user-") && email.ends_with("@example.com"));

        let (_, second) = get_json(app, "/").await;
        assert_eq!(second["total_users"], 2);
        assert_eq!(second["all_users"].as_array().unwrap().len(), 2);
        assert_ne!(second["new_user"]["email"], first["new_user"]["email"]);
        assert_eq!(second["all_users"][1], second["new_user"]);
    }

    #[tokio::test]
    async fn total_users_tracks_active_rows() {
        let (state, store, _dir) = AppState::fake().await;
        let app = build_app(state);

        let mut last = 0;
        for _ in 0..5 {
            let (_, json) = get_json(app.clone(), "/").await;
            let total = json["total_users"].as_u64().unwrap();
            assert!(total >= last);
            last = total;
        }

        sqlx::query("UPDATE users SET deleted_at = '2024-01-01T00:00:00Z' WHERE id = 1")
            .execute(store.pool())
            .await
            .unwrap();
        let (_, json) = get_json(app, "/").await;
        let (active,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(json["total_users"].as_i64().unwrap(), active);
        assert_eq!(active, 5);
    }

    #[tokio::test]
    async fn every_visit_sees_its_own_insert() {
        let (state, _store, _dir) = AppState::fake().await;
        let app = build_app(state);

        for i in 1..=25u64 {
            let (status, json) = get_json(app.clone(), "/").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["total_users"].as_u64().unwrap(), i, "visit {i}");
            let all = json["all_users"].as_array().unwrap();
            assert!(all.contains(&json["new_user"]), "visit {i} missing its new user");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_visits_see_their_own_inserts() {
        let (state, _store, _dir) = AppState::fake().await;
        let app = build_app(state);

        let visits: Vec<_> = (0..16)
            .map(|_| tokio::spawn(get_json(app.clone(), "/")))
            .collect();
        for visit in visits {
            let (status, json) = visit.await.unwrap();
            assert_eq!(status, StatusCode::OK);
            let all = json["all_users"].as_array().unwrap();
            assert!(all.contains(&json["new_user"]));
            assert_eq!(json["total_users"].as_u64().unwrap(), all.len() as u64);
        }
    }

    #[tokio::test]
    async fn visit_fails_with_500_when_store_is_gone() {
        let (state, store, _dir) = AppState::fake().await;
        store.pool().close().await;
        let (status, json) = get_json(build_app(state), "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to create user");
    }

    #[tokio::test]
    async fn visit_fails_with_500_when_listing_fails() {
        let (mut state, store, _dir) = AppState::fake().await;
        state.store = Arc::new(ListFails(store.clone()));
        let (status, json) = get_json(build_app(state), "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Failed to fetch users");
        // the insert itself went through
        assert_eq!(store.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_pages_return_requested_status_without_body() {
        let (state, _store, _dir) = AppState::fake().await;
        let app = build_app(state);
        for (code, expected) in [
            ("502", StatusCode::BAD_GATEWAY),
            ("503", StatusCode::SERVICE_UNAVAILABLE),
            ("504", StatusCode::GATEWAY_TIMEOUT),
        ] {
            let (status, json) = get_json(app.clone(), &format!("/error/{code}")).await;
            assert_eq!(status, expected);
            assert_eq!(json, Value::Null);
        }
    }

    #[tokio::test]
    async fn error_pages_explain_usage_for_other_codes() {
        let (state, _store, _dir) = AppState::fake().await;
        let app = build_app(state);
        for code in ["999", "500", "abc"] {
            let (status, json) = get_json(app.clone(), &format!("/error/{code}")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["usage"], "/error/{502,503,504}");
        }
    }

    #[tokio::test]
    async fn error_pages_can_be_disabled() {
        let (mut state, _store, _dir) = AppState::fake().await;
        let mut config = (*state.config).clone();
        config.error_routes = false;
        state.config = Arc::new(config);
        let (status, _) = get_json(build_app(state), "/error/502").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn boom() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn panics_become_json_500() {
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));
        let (status, json) = get_json(app, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "internal server error");
    }
}
