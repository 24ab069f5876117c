//! # Domain Models
//!
//! These structs represent the core entities of Relay-Board.
//! Ids are storage-assigned, increasing integers; `0` as a user id means anonymous.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// User id reserved for unauthenticated posters.
pub const ANONYMOUS_USER_ID: i64 = 0;

/// Display name stored when a poster leaves the name blank.
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// Upper bound on message content, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Upper bound on comment content, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// A top-level post on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Hidden from public listings while set; the row itself is kept.
    pub banned: bool,
}

/// A message that has passed validation but has no id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Attaches the storage-assigned id. New messages are never banned.
    pub fn into_message(self, id: i64) -> Message {
        Message {
            id,
            user_id: self.user_id,
            username: self.username,
            content: self.content,
            created_at: self.created_at,
            banned: false,
        }
    }
}

/// A reply attached to exactly one message, with a bounded lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Comment {
    /// Expiry is derived, never stored: a comment is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A validated comment waiting for its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub message_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewComment {
    pub fn new(
        message_id: i64,
        user_id: i64,
        username: String,
        content: String,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            message_id,
            user_id,
            username,
            content,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn into_comment(self, id: i64) -> Comment {
        Comment {
            id,
            message_id: self.message_id,
            user_id: self.user_id,
            username: self.username,
            content: self.content,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Read-only projection of an account owned by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
    #[serde(default, alias = "is_banned")]
    pub banned: bool,
}

impl User {
    /// Roles allowed to ban, unban and delete content.
    pub fn is_moderator(&self) -> bool {
        !self.banned && matches!(self.role.as_str(), "admin" | "moderator")
    }
}

/// One page of the public listing. `total` counts visible rows only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: i64,
}
