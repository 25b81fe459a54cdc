// src/models/message.rs

use serde::{Deserialize, Serialize};

/// Index of a message within a source's history.
pub type Position = u64;

/// A message as returned by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Plain text post
    Text { text: String },
    /// Photo, video, document etc. with an optional caption
    Media {
        #[serde(default)]
        caption: Option<String>,
    },
    /// Join/pin/title-change and similar service entries
    Service,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text body if this is a plain text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A resolved reference to a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHandle {
    /// Identifier the source was configured with
    pub identifier: String,
    /// Backend-specific peer id
    pub peer_id: i64,
    /// Broadcast channels have a position bound; groups do not
    pub broadcast: bool,
}

/// Notification that a new message was posted to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessageEvent {
    pub source: String,
}
