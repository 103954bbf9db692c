use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{ChatId, Message, User};

/// Events the client sends to the realtime server.
///
/// Serialized as JSON text frames `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce presence for the authenticated user.
    #[serde(rename = "setup")]
    Setup(User),

    /// Enter the room of a chat. Idempotent on the server.
    #[serde(rename = "join chat")]
    JoinChat(ChatId),

    #[serde(rename = "typing")]
    Typing(ChatId),

    #[serde(rename = "stop typing")]
    StopTyping(ChatId),

    /// Relay a freshly persisted message to the other participants.
    #[serde(rename = "new message")]
    NewMessage(Message),
}

/// Events the realtime server pushes to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges `setup`; the connection is ready for use.
    #[serde(rename = "connected")]
    Connected,

    #[serde(rename = "typing")]
    Typing(ChatId),

    #[serde(rename = "stop typing")]
    StopTyping(ChatId),

    // The server spells it this way.
    #[serde(rename = "message recieved")]
    MessageReceived(Message),
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::from)
    }

    /// Whether this event may only go out on a ready connection.
    pub fn requires_ready(&self) -> bool {
        !matches!(self, Self::Setup(_))
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::from)
    }
}
