//! Open the two-party chat between the current user and someone else,
//! creating it on first contact.

use tracing::{debug, info};

use parley_shared::constants::DEFAULT_CHAT_NAME;
use parley_shared::{Chat, NewChat, UserId, UsersHash};

use crate::backend::ChatBackend;
use crate::error::{ClientError, Result};

/// Existing chat for the pair, or a new one.
///
/// Both users are checked before anything is written. Creation relies on
/// the backend's insert-or-get, so concurrent callers for the same pair end
/// up with the same chat.
pub async fn get_or_create_chat(
    backend: &dyn ChatBackend,
    current: &UserId,
    other: &UserId,
) -> Result<Chat> {
    if current == other {
        return Err(ClientError::ChatCreationFailed(
            "cannot open a chat with yourself".to_string(),
        ));
    }

    let participant_ids = vec![current.clone(), other.clone()];
    let users_hash = UsersHash::from_participants(&participant_ids);

    if let Some(chat) = backend
        .find_chat_by_users_hash(&users_hash)
        .await
        .map_err(creation_failed)?
    {
        debug!(chat = %chat.id, hash = %users_hash, "Found existing chat");
        return Ok(chat);
    }

    for user_id in &participant_ids {
        match backend.get_user_by_id(user_id).await.map_err(creation_failed)? {
            Some(_) => {}
            None => {
                return Err(ClientError::ChatCreationFailed(format!(
                    "user {user_id} does not exist"
                )))
            }
        }
    }

    let chat = backend
        .find_or_create_chat(&NewChat {
            users_hash,
            participant_ids,
            chat_name: DEFAULT_CHAT_NAME.to_string(),
            is_group_chat: false,
        })
        .await
        .map_err(creation_failed)?;
    info!(chat = %chat.id, with = %other, "Chat ready");
    Ok(chat)
}

fn creation_failed(e: ClientError) -> ClientError {
    match e {
        ClientError::ChatCreationFailed(_) => e,
        other => ClientError::ChatCreationFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use parley_shared::User;
    use parley_store::Database;

    use super::*;
    use crate::backend::LocalBackend;

    fn backend() -> LocalBackend {
        let db = Database::open_in_memory().unwrap();
        for id in ["u1", "u2"] {
            db.upsert_user(&User {
                id: id.into(),
                name: id.to_uppercase(),
                username: id.to_string(),
                image_url: None,
            })
            .unwrap();
        }
        LocalBackend::new(Arc::new(Mutex::new(db)))
    }

    #[tokio::test]
    async fn test_creates_once_then_finds() {
        let backend = backend();

        let created = get_or_create_chat(&backend, &"u1".into(), &"u2".into())
            .await
            .unwrap();
        assert_eq!(created.chat_name, "Sender");
        assert!(!created.is_group_chat);
        assert_eq!(created.users_hash.as_str(), "u1,u2");

        let found = get_or_create_chat(&backend, &"u2".into(), &"u1".into())
            .await
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_unknown_user_writes_nothing() {
        let backend = backend();

        let err = get_or_create_chat(&backend, &"u1".into(), &"ghost".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ChatCreationFailed(_)));
        assert!(backend
            .fetch_chats_for_user(&"u1".into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_self_chat_is_rejected() {
        let backend = backend();
        let err = get_or_create_chat(&backend, &"u1".into(), &"u1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ChatCreationFailed(_)));
    }
}
