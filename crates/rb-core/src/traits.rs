//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! The lifecycle logic only ever sees these seams, never a concrete store,
//! transport or auth technology.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::BoardEvent;
use crate::models::{Comment, Message, NewComment, NewMessage, User};

/// Data persistence contract for messages and their comments.
///
/// Every call is atomic from the caller's point of view. Absence is reported
/// as `None`/`false`, never as an `Err`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageRepo: Send + Sync {
    // Message Operations
    async fn create_message(&self, message: NewMessage) -> anyhow::Result<Message>;
    async fn get_message(&self, id: i64) -> anyhow::Result<Option<Message>>;
    /// Non-banned messages, newest first, plus the count of non-banned rows.
    async fn list_messages(&self, limit: i64, offset: i64) -> anyhow::Result<(Vec<Message>, i64)>;
    async fn list_all_messages(&self) -> anyhow::Result<Vec<Message>>;
    /// Returns `false` when no such message exists.
    async fn set_banned(&self, id: i64, banned: bool) -> anyhow::Result<bool>;
    /// Removes the message and every comment attached to it.
    async fn delete_message(&self, id: i64) -> anyhow::Result<bool>;

    // Comment Operations
    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<Comment>;
    async fn get_comment(&self, id: i64) -> anyhow::Result<Option<Comment>>;
    /// Comments with `expires_at > now`, oldest first.
    async fn list_comments(&self, message_id: i64, now: DateTime<Utc>) -> anyhow::Result<Vec<Comment>>;
    async fn delete_comment(&self, id: i64) -> anyhow::Result<bool>;
    /// Deletes every comment with `expires_at <= now`; returns how many went.
    async fn purge_expired_comments(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;
}

/// Identity contract with the external auth collaborator.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Looks a user up by id. `None` if the collaborator does not know it.
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>>;

    /// Resolves a bearer credential. `None` if the token is invalid.
    async fn validate_token(&self, token: &str) -> anyhow::Result<Option<User>>;
}

/// Sink for live-feed events. Must never block the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: BoardEvent);
}

/// Source of "now". Injected so expiry can be tested without waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
