//! # Live Feed Events
//!
//! The only records ever pushed to connected viewers. Each carries the full
//! current message; there are no partial or diff events.

use serde::{Deserialize, Serialize};

use crate::models::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum BoardEvent {
    MessageCreated(Message),
    MessageUpdated(Message),
}

impl BoardEvent {
    pub fn message(&self) -> &Message {
        match self {
            BoardEvent::MessageCreated(m) | BoardEvent::MessageUpdated(m) => m,
        }
    }

    /// Wire name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            BoardEvent::MessageCreated(_) => "message_created",
            BoardEvent::MessageUpdated(_) => "message_updated",
        }
    }

    /// Serializes to the self-describing JSON frame sent to viewers.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
