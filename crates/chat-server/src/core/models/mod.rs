use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A plain text chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl TextMessage {
    /// Stamp a message with the server clock at the moment of acceptance.
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A file shared into the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShared {
    /// Name as uploaded by the client
    pub original_name: String,
    /// Generated storage name
    pub filename: String,
    pub file_url: String,
    pub uploader: String,
    pub timestamp: DateTime<Utc>,
}

/// A persisted, broadcastable unit of chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Text(TextMessage),
    File(FileShared),
}

impl ChatEvent {
    pub fn sender(&self) -> &str {
        match self {
            ChatEvent::Text(m) => &m.username,
            ChatEvent::File(f) => &f.uploader,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChatEvent::Text(m) => m.timestamp,
            ChatEvent::File(f) => f.timestamp,
        }
    }
}

/// Presence metadata for one connected identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(rename = "socketId")]
    pub connection_id: String,
    pub avatar: String,
}

/// identity -> presence, ordered for stable output.
pub type Roster = BTreeMap<String, RosterEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarUpdate {
    pub username: String,
    pub avatar_url: String,
}

/// Events pushed from the server to every admitted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(TextMessage),
    NewFile(FileShared),
    UserList(Roster),
    UpdateAvatar(AvatarUpdate),
    /// Sent only to the connection whose request failed.
    Error { message: String },
}

impl From<ChatEvent> for ServerEvent {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::Text(m) => ServerEvent::NewMessage(m),
            ChatEvent::File(f) => ServerEvent::NewFile(f),
        }
    }
}

/// Events a client may send over its realtime connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage { message: String },
}
