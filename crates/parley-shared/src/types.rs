use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(UserId);
string_id!(ChatId);
string_id!(MessageId);

impl ChatId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Order-independent key for a participant set: ids sorted and joined with `,`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UsersHash(pub String);

impl UsersHash {
    pub fn from_participants<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let mut sorted: Vec<&str> = ids.into_iter().map(UserId::as_str).collect();
        sorted.sort_unstable();
        Self(sorted.join(","))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UsersHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user profile as seen by the chat core. Never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A two-party conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub chat_name: String,
    pub participant_ids: Vec<UserId>,
    pub users_hash: UsersHash,
    #[serde(default)]
    pub is_group_chat: bool,
    /// Newest message, maintained by the server on message creation.
    #[serde(default)]
    pub latest_message_id: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// A single chat message. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: User,
    pub chat_id: ChatId,
    pub created_at: DateTime<Utc>,
    /// Display-only flag; nothing in the client sets it.
    #[serde(default)]
    pub is_deleted: bool,
}

/// Payload for persisting a new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub content: String,
    pub sender: UserId,
    pub chat: ChatId,
    pub timestamp: DateTime<Utc>,
}

/// Payload for looking up or creating a two-party chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewChat {
    pub users_hash: UsersHash,
    pub participant_ids: Vec<UserId>,
    pub chat_name: String,
    pub is_group_chat: bool,
}

/// Unread entry for a message that arrived on a non-selected chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub message: Message,
}

impl Notification {
    pub fn chat_id(&self) -> &ChatId {
        &self.message.chat_id
    }
}

/// Realtime connection state as seen by the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}
