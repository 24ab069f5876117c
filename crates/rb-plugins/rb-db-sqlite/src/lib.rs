//! # rb-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rb-core` domain models. The schema lives in `./migrations` and is
//! embedded at compile time.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rb_core::models::{Comment, Message, NewComment, NewMessage};
use rb_core::traits::MessageRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub struct SqliteBoardRepo {
    pool: SqlitePool,
}

// Helpers for timestamp conversion
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("malformed timestamp {raw:?}"))?
        .with_timezone(&Utc))
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    user_id: i64,
    username: String,
    content: String,
    created_at: String,
    is_banned: bool,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> anyhow::Result<Self> {
        Ok(Message {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            created_at: decode_ts(&row.created_at)?,
            banned: row.is_banned,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    message_id: i64,
    user_id: i64,
    username: String,
    content: String,
    created_at: String,
    expires_at: String,
}

impl TryFrom<CommentRow> for Comment {
    type Error = anyhow::Error;

    fn try_from(row: CommentRow) -> anyhow::Result<Self> {
        Ok(Comment {
            id: row.id,
            message_id: row.message_id,
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            created_at: decode_ts(&row.created_at)?,
            expires_at: decode_ts(&row.expires_at)?,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, user_id, username, content, created_at, is_banned";
const COMMENT_COLUMNS: &str = "id, message_id, user_id, username, content, created_at, expires_at";

impl SqliteBoardRepo {
    /// Opens the database at `url` with a small default pool.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        Self::connect(url, 5).await
    }

    /// Opens (or creates) the database and runs pending migrations.
    ///
    /// In-memory databases live and die with their connection, so they are
    /// pinned to a single connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid SQLite url {url:?}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open SQLite database {url:?}"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run SQLite migrations")?;

        info!(url, in_memory, "SQLite board store ready");
        Ok(Self { pool })
    }

    fn rows_to<T, R>(rows: Vec<R>) -> anyhow::Result<Vec<T>>
    where
        T: TryFrom<R, Error = anyhow::Error>,
    {
        rows.into_iter().map(T::try_from).collect()
    }
}

#[async_trait]
impl MessageRepo for SqliteBoardRepo {
    async fn create_message(&self, message: NewMessage) -> anyhow::Result<Message> {
        let result = sqlx::query(
            "INSERT INTO messages (user_id, username, content, created_at, is_banned) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(message.user_id)
        .bind(&message.username)
        .bind(&message.content)
        .bind(encode_ts(message.created_at))
        .execute(&self.pool)
        .await?;

        Ok(message.into_message(result.last_insert_rowid()))
    }

    async fn get_message(&self, id: i64) -> anyhow::Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn list_messages(&self, limit: i64, offset: i64) -> anyhow::Result<(Vec<Message>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE is_banned = 0")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE is_banned = 0 \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((Self::rows_to(rows)?, total))
    }

    async fn list_all_messages(&self) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to(rows)
    }

    async fn set_banned(&self, id: i64, banned: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE messages SET is_banned = ? WHERE id = ?")
            .bind(banned)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes the message and its comments in one transaction.
    ///
    /// The foreign key already cascades; the explicit comment delete keeps the
    /// guarantee even on a connection opened without `foreign_keys`.
    async fn delete_message(&self, id: i64) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE message_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let result = sqlx::query(
            "INSERT INTO comments (message_id, user_id, username, content, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.message_id)
        .bind(comment.user_id)
        .bind(&comment.username)
        .bind(&comment.content)
        .bind(encode_ts(comment.created_at))
        .bind(encode_ts(comment.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(comment.into_comment(result.last_insert_rowid()))
    }

    async fn get_comment(&self, id: i64) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Comment::try_from).transpose()
    }

    async fn list_comments(&self, message_id: i64, now: DateTime<Utc>) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE message_id = ? AND expires_at > ? \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(message_id)
        .bind(encode_ts(now))
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to(rows)
    }

    async fn delete_comment(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired_comments(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM comments WHERE expires_at <= ?")
            .bind(encode_ts(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
