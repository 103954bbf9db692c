//! [`ChatBackend`] over the HTTP API.
//!
//! Routes, relative to the configured base URL:
//!
//! | call | route |
//! |------|-------|
//! | fetch chats | `GET chats/{userId}` |
//! | fetch messages | `GET messages/{chatId}` |
//! | create message | `POST messages` |
//! | chat by hash | `GET chats/hash/{usersHash}` |
//! | find or create chat | `POST chats` |
//! | user by id | `GET users/{id}` |

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use parley_shared::{Chat, ChatId, Message, NewChat, NewMessage, User, UserId, UsersHash};

use super::ChatBackend;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    base: Url,
}

impl RestBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    /// Base URL plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }

    /// Like [`Self::get_json`] but a 404 is `None`.
    async fn get_optional<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

#[async_trait]
impl ChatBackend for RestBackend {
    async fn fetch_chats_for_user(&self, user_id: &UserId) -> Result<Vec<Chat>> {
        self.get_json(&["chats", user_id.as_str()]).await
    }

    async fn fetch_messages_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        self.get_json(&["messages", chat_id.as_str()]).await
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message> {
        let url = self.endpoint(&["messages"])?;
        debug!(%url, chat = %message.chat, "POST");
        let response = self.client.post(url).json(message).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::MessageCreationFailed(format!(
                "server answered {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn find_chat_by_users_hash(&self, hash: &UsersHash) -> Result<Option<Chat>> {
        self.get_optional(&["chats", "hash", hash.as_str()]).await
    }

    async fn find_or_create_chat(&self, chat: &NewChat) -> Result<Chat> {
        let url = self.endpoint(&["chats"])?;
        debug!(%url, hash = %chat.users_hash, "POST");
        let response = self.client.post(url).json(chat).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::ChatCreationFailed(format!(
                "server answered {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        self.get_optional(&["users", user_id.as_str()]).await
    }
}
