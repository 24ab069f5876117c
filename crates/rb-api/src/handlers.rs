//! # rb-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the board service.
//! Handlers stay thin: pick the author, call one service operation, shape the JSON.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rb_core::{AppError, Comment, Message, MessagePage, ANONYMOUS_USER_ID};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::ApiError;
use crate::middleware::{Moderator, Viewer};
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    /// Non-positive limits fall back to the default; negative offsets to zero.
    fn resolve(&self) -> (i64, i64) {
        let limit = match self.limit {
            Some(l) if l > 0 => l.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

#[derive(Debug, Deserialize)]
pub struct PostBody {
    pub content: String,
    /// Display name for anonymous posters; ignored when a token is supplied.
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdBody {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagesBody {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct CommentsBody {
    pub comments: Vec<Comment>,
}

fn author(viewer: &Viewer, body: &PostBody) -> (i64, String) {
    match &viewer.0 {
        Some(user) => (user.id, user.username.clone()),
        None => (ANONYMOUS_USER_ID, body.username.clone().unwrap_or_default()),
    }
}

fn success() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

// ── Messages ────────────────────────────────────────────────────────────────

pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<MessagePage>, ApiError> {
    let (limit, offset) = params.resolve();
    Ok(Json(state.board.get_messages(limit, offset).await?))
}

pub async fn list_all_messages(
    State(state): State<AppState>,
    Moderator(_): Moderator,
) -> Result<Json<MessagesBody>, ApiError> {
    let messages = state.board.get_all_messages().await?;
    Ok(Json(MessagesBody { messages }))
}

pub async fn create_message(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<PostBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, username) = author(&viewer, &body);
    let message = state.board.create_message(user_id, &username, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Banned messages are only visible to moderators.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    viewer: Viewer,
) -> Result<Json<Message>, ApiError> {
    let message = state.board.get_message(id).await?;
    if message.banned && !viewer.is_moderator() {
        return Err(AppError::NotFound("message", id).into());
    }
    Ok(Json(message))
}

/// Bans by default; `?action=delete` removes the message and its comments.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteParams>,
    Moderator(moderator): Moderator,
) -> Result<impl IntoResponse, ApiError> {
    match params.action.as_deref() {
        None | Some("ban") => state.board.ban_message(id).await?,
        Some("delete") => state.board.delete_message(id).await?,
        Some(other) => return Err(ApiError::BadRequest(format!("unknown action {other:?}"))),
    }
    info!(message_id = id, moderator_id = moderator.id, action = params.action.as_deref().unwrap_or("ban"), "moderation applied");
    Ok(success())
}

pub async fn ban_message(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Json(body): Json<IdBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.board.ban_message(body.id).await?;
    info!(message_id = body.id, moderator_id = moderator.id, "message banned");
    Ok(success())
}

pub async fn unban_message(
    State(state): State<AppState>,
    Moderator(moderator): Moderator,
    Json(body): Json<IdBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.board.unban_message(body.id).await?;
    info!(message_id = body.id, moderator_id = moderator.id, "message unbanned");
    Ok(success())
}

// ── Comments ────────────────────────────────────────────────────────────────

pub async fn list_comments(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> Result<Json<CommentsBody>, ApiError> {
    let comments = state.board.get_comments(message_id).await?;
    Ok(Json(CommentsBody { comments }))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    viewer: Viewer,
    Json(body): Json<PostBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, username) = author(&viewer, &body);
    let comment = state
        .board
        .create_comment(message_id, user_id, &username, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(state.board.get_comment(id).await?))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Moderator(_): Moderator,
) -> Result<StatusCode, ApiError> {
    state.board.delete_comment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Health ──────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let live_sessions = state.hub.live_sessions().await;
    Json(json!({ "status": "ok", "live_sessions": live_sessions }))
}
