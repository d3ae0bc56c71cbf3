//! Outbound chat events
//!
//! Every event carries `type`, `user`, `content` and a millisecond
//! `timestamp`; presence events also carry the ordered `users` list.

use serde::{Deserialize, Serialize};

use super::constants::{SYSTEM_USER, USER_LIST_NOTICE};
use crate::registry::OutboundFrame;

/// Event sent from the relay to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Chat line from an identified viewer
    Message {
        user: String,
        content: String,
        timestamp: i64,
    },
    /// Join/leave/rejection notice
    System {
        user: String,
        content: String,
        timestamp: i64,
    },
    /// Presence snapshot
    UserList {
        user: String,
        content: String,
        timestamp: i64,
        users: Vec<String>,
    },
}

impl ServerEvent {
    /// Chat line attributed to `user`
    pub fn chat(user: impl Into<String>, content: impl Into<String>, timestamp: i64) -> Self {
        ServerEvent::Message {
            user: user.into(),
            content: content.into(),
            timestamp,
        }
    }

    /// Notice from the synthetic `System` sender
    pub fn system(content: impl Into<String>, timestamp: i64) -> Self {
        ServerEvent::System {
            user: SYSTEM_USER.to_string(),
            content: content.into(),
            timestamp,
        }
    }

    /// Full presence list in claim order
    pub fn user_list(users: Vec<String>, timestamp: i64) -> Self {
        ServerEvent::UserList {
            user: SYSTEM_USER.to_string(),
            content: USER_LIST_NOTICE.to_string(),
            timestamp,
            users,
        }
    }

    /// `{name} joined the chat`
    pub fn joined(name: &str, timestamp: i64) -> Self {
        Self::system(format!("{} joined the chat", name), timestamp)
    }

    /// `{name} left the chat`
    pub fn left(name: &str, timestamp: i64) -> Self {
        Self::system(format!("{} left the chat", name), timestamp)
    }

    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Message { .. } => "message",
            ServerEvent::System { .. } => "system",
            ServerEvent::UserList { .. } => "userList",
        }
    }

    /// Sender name
    pub fn user(&self) -> &str {
        match self {
            ServerEvent::Message { user, .. }
            | ServerEvent::System { user, .. }
            | ServerEvent::UserList { user, .. } => user,
        }
    }

    /// Human-readable text
    pub fn content(&self) -> &str {
        match self {
            ServerEvent::Message { content, .. }
            | ServerEvent::System { content, .. }
            | ServerEvent::UserList { content, .. } => content,
        }
    }

    /// Receipt time in epoch milliseconds
    pub fn timestamp(&self) -> i64 {
        match self {
            ServerEvent::Message { timestamp, .. }
            | ServerEvent::System { timestamp, .. }
            | ServerEvent::UserList { timestamp, .. } => *timestamp,
        }
    }

    /// Presence list, if this is a presence event
    pub fn users(&self) -> Option<&[String]> {
        match self {
            ServerEvent::UserList { users, .. } => Some(users.as_slice()),
            _ => None,
        }
    }

    /// Serialize once into a frame shared by every recipient
    pub fn encode(&self) -> Result<OutboundFrame, serde_json::Error> {
        serde_json::to_string(self).map(OutboundFrame::from)
    }
}
