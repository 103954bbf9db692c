//! Persistence collaborators the chat core talks to.
//!
//! [`ChatBackend`] is the seam between the session and wherever chats live:
//! a remote REST API ([`RestBackend`]) or the local SQLite store
//! ([`LocalBackend`]).

mod local;
mod rest;

use async_trait::async_trait;

use parley_shared::{Chat, ChatId, Message, NewChat, NewMessage, User, UserId, UsersHash};

use crate::error::Result;

pub use local::LocalBackend;
pub use rest::RestBackend;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Chats the user participates in, most recently active first.
    async fn fetch_chats_for_user(&self, user_id: &UserId) -> Result<Vec<Chat>>;

    /// Full history of a chat in creation order.
    async fn fetch_messages_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>>;

    /// Persist a message. The returned record carries the authoritative id
    /// and creation time.
    async fn create_message(&self, message: &NewMessage) -> Result<Message>;

    async fn find_chat_by_users_hash(&self, hash: &UsersHash) -> Result<Option<Chat>>;

    /// Atomic insert-or-get keyed on `users_hash`.
    async fn find_or_create_chat(&self, chat: &NewChat) -> Result<Chat>;

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<Option<User>>;
}
