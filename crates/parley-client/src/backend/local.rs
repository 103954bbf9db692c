//! [`ChatBackend`] over the local SQLite store.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use parley_shared::{
    Chat, ChatId, Message, MessageId, NewChat, NewMessage, User, UserId, UsersHash,
};
use parley_store::{Database, StoreError};

use super::ChatBackend;
use crate::error::{ClientError, Result};

/// Store-backed collaborator. Clones share one connection.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
}

impl LocalBackend {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    async fn fetch_chats_for_user(&self, user_id: &UserId) -> Result<Vec<Chat>> {
        Ok(self.lock().list_chats_for_user(user_id)?)
    }

    async fn fetch_messages_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        Ok(self.lock().get_messages_for_chat(chat_id)?)
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message> {
        let id = MessageId::generate();
        let stored = self
            .lock()
            .insert_message(&id, message, Utc::now())
            .map_err(|e| match e {
                StoreError::UnknownReference { kind, id } => {
                    ClientError::MessageCreationFailed(format!("unknown {kind} {id}"))
                }
                other => ClientError::Store(other),
            })?;
        debug!(message = %stored.id, chat = %stored.chat_id, "Message stored locally");
        Ok(stored)
    }

    async fn find_chat_by_users_hash(&self, hash: &UsersHash) -> Result<Option<Chat>> {
        Ok(self.lock().find_chat_by_users_hash(hash)?)
    }

    async fn find_or_create_chat(&self, chat: &NewChat) -> Result<Chat> {
        self.lock()
            .insert_chat_if_absent(chat, &ChatId::generate(), Utc::now())
            .map_err(|e| match e {
                StoreError::UnknownReference { kind, id } => {
                    ClientError::ChatCreationFailed(format!("unknown {kind} {id}"))
                }
                other => ClientError::Store(other),
            })
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.lock().get_user(user_id)?)
    }
}
