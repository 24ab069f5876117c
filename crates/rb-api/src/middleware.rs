//! rb-api Middleware
//!
//! Request tracing, CORS, and the bearer-token extractors handlers use to
//! learn who is calling.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::Method;
use rb_core::{AppError, User};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// One span per request, with method, path and status.
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

// The board UI may be served from another origin.
pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// The raw credential from `Authorization: Bearer <token>`.
///
/// `Ok(None)` when the header is absent; a header in any other shape is an
/// invalid token rather than an anonymous caller.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;
    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(Some(token)),
        _ => Err(ApiError::InvalidToken),
    }
}

async fn resolve(state: &AppState, token: &str) -> Result<User, ApiError> {
    let timeout = state.board.policy().auth_timeout;
    match tokio::time::timeout(timeout, state.auth.validate_token(token)).await {
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "token validation timed out");
            Err(AppError::Unauthorized("identity could not be confirmed in time".into()).into())
        }
        Ok(Err(e)) => Err(AppError::dependency(e).into()),
        Ok(Ok(None)) => {
            debug!("rejected bearer token");
            Err(ApiError::InvalidToken)
        }
        Ok(Ok(Some(user))) => Ok(user),
    }
}

/// Caller identity when a token is optional. `None` is an anonymous caller.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn is_moderator(&self) -> bool {
        self.0.as_ref().is_some_and(User::is_moderator)
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(Viewer(Some(resolve(state, token).await?))),
            None => Ok(Viewer(None)),
        }
    }
}

/// A validated caller allowed to moderate content.
#[derive(Debug, Clone)]
pub struct Moderator(pub User);

impl FromRequestParts<AppState> for Moderator {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(ApiError::MissingToken)?;
        let user = resolve(state, token).await?;
        if !user.is_moderator() {
            warn!(user_id = user.id, role = %user.role, "moderation attempt without privileges");
            return Err(AppError::Unauthorized("moderator role required".into()).into());
        }
        Ok(Moderator(user))
    }
}
