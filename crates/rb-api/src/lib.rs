//! # rb-api
//!
//! The web routing layer for Relay-Board: the JSON API under `/api/v1`,
//! including the WebSocket live feed and the health probe.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use rb_core::AuthProvider;
use rb_hub::HubHandle;
use rb_services::BoardService;

pub use error::ApiError;
pub use middleware::{Moderator, Viewer};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<BoardService>,
    /// Resolves bearer tokens for the extractors.
    pub auth: Arc<dyn AuthProvider>,
    pub hub: HubHandle,
}

/// Builds the full application router.
///
/// Mounted under `/api/v1` so the binary can serve other things beside it.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/messages", get(handlers::list_messages).post(handlers::create_message))
        .route("/messages/all", get(handlers::list_all_messages))
        .route("/messages/ban", post(handlers::ban_message))
        .route("/messages/unban", post(handlers::unban_message))
        .route("/messages/{id}", get(handlers::get_message).delete(handlers::delete_message))
        .route(
            "/messages/{id}/comments",
            get(handlers::list_comments).post(handlers::create_comment),
        )
        .route("/comments/{id}", get(handlers::get_comment).delete(handlers::delete_comment))
        .route("/ws", get(ws::upgrade))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(middleware::trace_layer())
        .layer(middleware::cors_policy())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use rb_core::testing::{ManualClock, MockAuthProvider, MockMessageRepo};
    use rb_core::{Message, NewMessage, User};
    use rb_hub::Hub;
    use rb_services::BoardPolicy;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn moderator() -> User {
        User { id: 1, username: "mod".into(), role: "moderator".into(), banned: false }
    }

    fn message(id: i64, banned: bool) -> Message {
        Message {
            id,
            user_id: 0,
            username: "anonymous".into(),
            content: "hello".into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            banned,
        }
    }

    fn app(repo: MockMessageRepo, auth: MockAuthProvider) -> Router {
        let (hub, _task) = Hub::spawn(8);
        let auth: Arc<dyn AuthProvider> = Arc::new(auth);
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        let board = BoardService::new(
            Arc::new(repo),
            Arc::clone(&auth),
            Arc::new(hub.clone()),
            clock,
            BoardPolicy::default(),
        );
        router(AppState { board: Arc::new(board), auth, hub })
    }

    fn tokens() -> MockAuthProvider {
        let mut auth = MockAuthProvider::new();
        auth.expect_validate_token().returning(|token| match token {
            "mod-token" => Ok(Some(moderator())),
            "user-token" => Ok(Some(User { id: 2, username: "bob".into(), role: "user".into(), banned: false })),
            _ => Ok(None),
        });
        auth
    }

    async fn send(app: Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn test_anonymous_post_is_created() {
        let mut repo = MockMessageRepo::new();
        repo.expect_create_message()
            .withf(|m: &NewMessage| m.user_id == 0 && m.username == "anonymous" && m.content == "hi")
            .returning(|m| Ok(m.into_message(5)));

        let (status, body) = send(
            app(repo, MockAuthProvider::new()),
            Method::POST,
            "/api/v1/messages",
            None,
            Some(json!({"content": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 5);
    }

    #[tokio::test]
    async fn test_invalid_token_is_401() {
        let (status, body) = send(
            app(MockMessageRepo::new(), tokens()),
            Method::POST,
            "/api/v1/messages",
            Some("nope"),
            Some(json!({"content": "hi"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid token");
    }

    #[tokio::test]
    async fn test_moderation_requires_token_and_role() {
        let (status, _) = send(
            app(MockMessageRepo::new(), tokens()),
            Method::POST,
            "/api/v1/messages/ban",
            None,
            Some(json!({"id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            app(MockMessageRepo::new(), tokens()),
            Method::POST,
            "/api/v1/messages/ban",
            Some("user-token"),
            Some(json!({"id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_moderator_ban_succeeds() {
        let mut repo = MockMessageRepo::new();
        repo.expect_get_message().returning(|id| Ok(Some(message(id, false))));
        repo.expect_set_banned().withf(|id, banned| *id == 3 && *banned).returning(|_, _| Ok(true));

        let (status, body) = send(
            app(repo, tokens()),
            Method::POST,
            "/api/v1/messages/ban",
            Some("mod-token"),
            Some(json!({"id": 3})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_banned_message_hidden_from_public_read() {
        let repo = || {
            let mut repo = MockMessageRepo::new();
            repo.expect_get_message().returning(|id| Ok(Some(message(id, true))));
            repo
        };

        let (status, _) = send(app(repo(), tokens()), Method::GET, "/api/v1/messages/4", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(app(repo(), tokens()), Method::GET, "/api/v1/messages/4", Some("mod-token"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["banned"], true);
    }

    #[tokio::test]
    async fn test_delete_with_unknown_action_is_400() {
        let (status, _) = send(
            app(MockMessageRepo::new(), tokens()),
            Method::DELETE,
            "/api/v1/messages/1?action=shred",
            Some("mod-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_storage_failure_is_503() {
        let mut repo = MockMessageRepo::new();
        repo.expect_list_messages().returning(|_, _| Err(anyhow::anyhow!("database is locked")));

        let (status, body) = send(app(repo, MockAuthProvider::new()), Method::GET, "/api/v1/messages", None, None).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "service temporarily unavailable");
    }

    #[tokio::test]
    async fn test_listing_passes_resolved_page() {
        let mut repo = MockMessageRepo::new();
        repo.expect_list_messages()
            .withf(|limit, offset| *limit == 2 && *offset == 0)
            .returning(|_, _| Ok((vec![message(9, false)], 7)));

        let (status, body) = send(
            app(repo, MockAuthProvider::new()),
            Method::GET,
            "/api/v1/messages?limit=2&offset=-3",
            None,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 7);
        assert_eq!(body["messages"][0]["id"], 9);
    }

    #[tokio::test]
    async fn test_health_reports_live_sessions() {
        let (status, body) = send(app(MockMessageRepo::new(), MockAuthProvider::new()), Method::GET, "/api/v1/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "live_sessions": 0}));
    }
}
