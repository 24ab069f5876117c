//! # Board Service
//!
//! Business rules for messages and comments. This is the only place that
//! decides what reaches the live feed: message creation and ban/unban are
//! announced, comments and hard deletes are not.
//!
//! Every write validates its input before the first port call, performs at
//! most one logical mutation, and never retries a failed dependency.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TtlDuration;
use rb_core::{
    AppError, AuthProvider, BoardEvent, Clock, Comment, EventPublisher, Message, MessagePage,
    MessageRepo, NewComment, NewMessage, Result, ANONYMOUS_USERNAME, ANONYMOUS_USER_ID,
    MAX_COMMENT_CHARS, MAX_MESSAGE_CHARS,
};
use tracing::{debug, info, warn};

/// Tunables the service needs from configuration.
#[derive(Debug, Clone)]
pub struct BoardPolicy {
    /// Lifetime of a comment, counted from its creation.
    pub comment_ttl: TtlDuration,
    /// Upper bound on one auth collaborator lookup.
    pub auth_timeout: Duration,
}

impl Default for BoardPolicy {
    fn default() -> Self {
        Self {
            comment_ttl: TtlDuration::minutes(5),
            auth_timeout: Duration::from_secs(3),
        }
    }
}

/// The lifecycle manager.
pub struct BoardService {
    repo: Arc<dyn MessageRepo>,
    auth: Arc<dyn AuthProvider>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    policy: BoardPolicy,
}

impl BoardService {
    pub fn new(
        repo: Arc<dyn MessageRepo>,
        auth: Arc<dyn AuthProvider>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: BoardPolicy,
    ) -> Self {
        Self { repo, auth, events, clock, policy }
    }

    pub fn policy(&self) -> &BoardPolicy {
        &self.policy
    }

    // ── Messages ────────────────────────────────────────────────────────────

    /// Validates, authorizes, persists and announces a new message.
    pub async fn create_message(&self, user_id: i64, username: &str, content: &str) -> Result<Message> {
        // 1. Input checks, before any collaborator is touched
        validate_user_id(user_id)?;
        validate_content(content, MAX_MESSAGE_CHARS, "message")?;

        // 2. Identity: anonymous posters skip the lookup
        self.authorize_author(user_id).await?;

        // 3. Persistence
        let message = self
            .repo
            .create_message(NewMessage {
                user_id,
                username: author_name(username),
                content: content.to_string(),
                created_at: self.clock.now(),
            })
            .await
            .map_err(AppError::dependency)?;
        info!(message_id = message.id, user_id, "message created");

        // 4. Live feed
        self.events.publish(BoardEvent::MessageCreated(message.clone()));
        Ok(message)
    }

    pub async fn get_message(&self, id: i64) -> Result<Message> {
        self.repo
            .get_message(id)
            .await
            .map_err(AppError::dependency)?
            .ok_or(AppError::NotFound("message", id))
    }

    /// Public listing: banned messages are invisible and not counted.
    pub async fn get_messages(&self, limit: i64, offset: i64) -> Result<MessagePage> {
        let (messages, total) = self
            .repo
            .list_messages(limit, offset)
            .await
            .map_err(AppError::dependency)?;
        debug!(limit, offset, returned = messages.len(), total, "listed messages");
        Ok(MessagePage { messages, total })
    }

    /// Unfiltered listing for privileged callers.
    pub async fn get_all_messages(&self) -> Result<Vec<Message>> {
        self.repo.list_all_messages().await.map_err(AppError::dependency)
    }

    pub async fn ban_message(&self, id: i64) -> Result<()> {
        self.set_banned(id, true).await
    }

    pub async fn unban_message(&self, id: i64) -> Result<()> {
        self.set_banned(id, false).await
    }

    async fn set_banned(&self, id: i64, banned: bool) -> Result<()> {
        let mut message = self.get_message(id).await?;

        // A concurrent hard delete can win between the read and the update.
        if !self.repo.set_banned(id, banned).await.map_err(AppError::dependency)? {
            return Err(AppError::NotFound("message", id));
        }
        info!(message_id = id, banned, "message visibility changed");

        message.banned = banned;
        self.events.publish(BoardEvent::MessageUpdated(message));
        Ok(())
    }

    /// Hard delete, cascading to comments. Not announced on the live feed.
    pub async fn delete_message(&self, id: i64) -> Result<()> {
        self.get_message(id).await?;
        if !self.repo.delete_message(id).await.map_err(AppError::dependency)? {
            return Err(AppError::NotFound("message", id));
        }
        info!(message_id = id, "message deleted");
        Ok(())
    }

    // ── Comments ────────────────────────────────────────────────────────────

    pub async fn create_comment(
        &self,
        message_id: i64,
        user_id: i64,
        username: &str,
        content: &str,
    ) -> Result<Comment> {
        // 1. Input checks
        validate_user_id(user_id)?;
        validate_content(content, MAX_COMMENT_CHARS, "comment")?;

        // 2. Identity
        self.authorize_author(user_id).await?;

        // 3. Parent must exist right now
        self.get_message(message_id).await?;

        // 4. Persistence, with the deadline fixed at creation
        let created = self
            .repo
            .create_comment(NewComment::new(
                message_id,
                user_id,
                author_name(username),
                content.to_string(),
                self.clock.now(),
                self.policy.comment_ttl,
            ))
            .await;
        let comment = match created {
            Ok(comment) => comment,
            // A hard delete can land between step 3 and the insert.
            Err(e) => match self.repo.get_message(message_id).await {
                Ok(None) => return Err(AppError::NotFound("message", message_id)),
                _ => return Err(AppError::dependency(e)),
            },
        };
        info!(comment_id = comment.id, message_id, user_id, "comment created");
        Ok(comment)
    }

    /// Live comments of a message, oldest first.
    pub async fn get_comments(&self, message_id: i64) -> Result<Vec<Comment>> {
        self.get_message(message_id).await?;

        let now = self.clock.now();
        let mut comments = self
            .repo
            .list_comments(message_id, now)
            .await
            .map_err(AppError::dependency)?;
        comments.retain(|c| !c.is_expired_at(now));
        Ok(comments)
    }

    /// An expired comment reads as absent even before the sweep removes it.
    pub async fn get_comment(&self, id: i64) -> Result<Comment> {
        match self.repo.get_comment(id).await.map_err(AppError::dependency)? {
            Some(comment) if !comment.is_expired_at(self.clock.now()) => Ok(comment),
            _ => Err(AppError::NotFound("comment", id)),
        }
    }

    pub async fn delete_comment(&self, id: i64) -> Result<()> {
        if self.repo.get_comment(id).await.map_err(AppError::dependency)?.is_none() {
            return Err(AppError::NotFound("comment", id));
        }
        if !self.repo.delete_comment(id).await.map_err(AppError::dependency)? {
            return Err(AppError::NotFound("comment", id));
        }
        info!(comment_id = id, "comment deleted");
        Ok(())
    }

    /// Removes every expired comment. Idempotent; the count is informational.
    pub async fn expire_comments(&self) -> Result<u64> {
        let removed = self
            .repo
            .purge_expired_comments(self.clock.now())
            .await
            .map_err(AppError::dependency)?;
        if removed > 0 {
            info!(removed, "expired comments purged");
        }
        Ok(removed)
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    async fn authorize_author(&self, user_id: i64) -> Result<()> {
        if user_id == ANONYMOUS_USER_ID {
            return Ok(());
        }

        let lookup = tokio::time::timeout(self.policy.auth_timeout, self.auth.get_user(user_id)).await;
        match lookup {
            Err(_) => {
                warn!(user_id, timeout_ms = self.policy.auth_timeout.as_millis() as u64, "user lookup timed out");
                Err(AppError::Unauthorized(format!("could not verify user {user_id}")))
            }
            Ok(Err(e)) => Err(AppError::dependency(e.context("auth collaborator lookup failed"))),
            Ok(Ok(None)) => Err(AppError::Unauthorized(format!("unknown user {user_id}"))),
            Ok(Ok(Some(user))) if user.banned => {
                info!(user_id, "rejected write from banned user");
                Err(AppError::Unauthorized("user is banned".into()))
            }
            Ok(Ok(Some(_))) => Ok(()),
        }
    }
}

fn validate_user_id(user_id: i64) -> Result<()> {
    if user_id < 0 {
        return Err(AppError::ValidationError(format!("invalid user id {user_id}")));
    }
    Ok(())
}

fn validate_content(content: &str, max_chars: usize, what: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{what} content cannot be empty")));
    }
    let chars = content.chars().count();
    if chars > max_chars {
        return Err(AppError::ValidationError(format!(
            "{what} content is too long ({chars} > {max_chars} characters)"
        )));
    }
    Ok(())
}

fn author_name(username: &str) -> String {
    match username.trim() {
        "" => ANONYMOUS_USERNAME.to_string(),
        name => name.to_string(),
    }
}
