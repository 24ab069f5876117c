//! HTTP view of board failures.
//!
//! Handlers return `Result<_, ApiError>`; the body is always `{"error": "..."}`.
//! Dependency failures are logged in full and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rb_core::AppError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("authorization header required")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::App(AppError::ValidationError(_)) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::App(AppError::NotFound(..)) => StatusCode::NOT_FOUND,
            ApiError::App(AppError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::App(AppError::Dependency(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::MissingToken | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::App(AppError::Dependency(detail)) => {
                error!(error = %detail, "dependency failure while serving request");
                "service temporarily unavailable".to_owned()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(AppError::ValidationError("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(AppError::NotFound("message", 1)), StatusCode::NOT_FOUND),
            (ApiError::from(AppError::Unauthorized("banned".into())), StatusCode::FORBIDDEN),
            (ApiError::from(AppError::Dependency("db".into())), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::MissingToken, StatusCode::UNAUTHORIZED),
            (ApiError::InvalidToken, StatusCode::UNAUTHORIZED),
            (ApiError::BadRequest("action".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }

    #[tokio::test]
    async fn test_dependency_detail_is_not_leaked() {
        let response = ApiError::from(AppError::Dependency("sqlite: disk I/O error at /var/db".into())).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("service temporarily unavailable"));
        assert!(!text.contains("/var/db"));
    }

    #[tokio::test]
    async fn test_not_found_body_names_the_entity() {
        let response = ApiError::from(AppError::NotFound("comment", 42)).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["error"], "comment not found with ID 42");
    }
}
