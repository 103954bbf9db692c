//! What the session tells the UI.

use serde::Serialize;

use parley_shared::{ChatId, ConnectionState};

use crate::notifications::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCue {
    /// Our message was stored.
    Sent,
    /// A message arrived in the open chat.
    Receive,
    /// A message arrived elsewhere and an alert was raised.
    Notification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ChatsUpdated,
    SelectionChanged(Option<ChatId>),
    HistoryChanged,
    ReceiverResolved { chat_id: ChatId, name: String },
    PeerTyping { chat_id: ChatId, typing: bool },
    NotificationsChanged { unread: usize },
    Alert(Alert),
    Sound(SoundCue),
    Connection(ConnectionState),
    /// Transient error message for a toast.
    Notice(String),
    /// Content of a discarded failed send, to put back into the compose box.
    ComposeRestored(String),
}
