//! The user's chat list and the currently selected chat.

use tracing::debug;

use parley_shared::{Chat, ChatId, MessageId};

use crate::error::{ClientError, Result};
use crate::storage::LocalState;

#[derive(Debug)]
pub struct ChatDirectory {
    chats: Vec<Chat>,
    selected: Option<ChatId>,
    state: LocalState,
}

impl ChatDirectory {
    pub fn new(state: LocalState) -> Self {
        Self {
            chats: Vec::new(),
            selected: None,
            state,
        }
    }

    /// Replace the list with a fresh fetch.
    ///
    /// With nothing selected yet, the persisted selection is restored if the
    /// chat is still in the list. Returns `true` when that happened.
    pub fn load(&mut self, chats: Vec<Chat>) -> bool {
        self.chats = chats;

        if let Some(id) = &self.selected {
            if self.get(id).is_none() {
                debug!(chat = %id, "Selected chat vanished from directory");
                self.selected = None;
                self.state.clear_selected_chat();
            }
            return false;
        }

        let Some(persisted) = self.state.selected_chat() else {
            return false;
        };
        match self.chats.iter().find(|c| c.id == persisted.id) {
            Some(chat) => {
                debug!(chat = %chat.id, "Restored persisted selection");
                self.state.store_selected_chat(chat);
                self.selected = Some(chat.id.clone());
                true
            }
            None => false,
        }
    }

    /// Insert a chat at the front, or replace it in place if known.
    /// Returns `true` if the chat was new.
    pub fn upsert(&mut self, chat: Chat) -> bool {
        match self.chats.iter_mut().find(|c| c.id == chat.id) {
            Some(existing) => {
                *existing = chat;
                false
            }
            None => {
                self.chats.insert(0, chat);
                true
            }
        }
    }

    pub fn select(&mut self, chat_id: &ChatId) -> Result<&Chat> {
        let chat = self
            .chats
            .iter()
            .find(|c| &c.id == chat_id)
            .ok_or_else(|| ClientError::UnknownChat(chat_id.clone()))?;
        self.state.store_selected_chat(chat);
        self.selected = Some(chat.id.clone());
        Ok(chat)
    }

    /// The chat page was (re)entered: nothing is selected any more.
    pub fn page_mounted(&mut self) {
        self.selected = None;
        self.state.clear_selected_chat();
    }

    /// Record a new latest message and move the chat to the front.
    /// Returns `false` for a chat this directory does not know.
    pub fn touch(&mut self, chat_id: &ChatId, message_id: &MessageId) -> bool {
        let Some(pos) = self.chats.iter().position(|c| &c.id == chat_id) else {
            return false;
        };
        let mut chat = self.chats.remove(pos);
        chat.latest_message_id = Some(message_id.clone());
        self.chats.insert(0, chat);
        true
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn get(&self, chat_id: &ChatId) -> Option<&Chat> {
        self.chats.iter().find(|c| &c.id == chat_id)
    }

    pub fn contains(&self, chat_id: &ChatId) -> bool {
        self.get(chat_id).is_some()
    }

    pub fn selected_id(&self) -> Option<&ChatId> {
        self.selected.as_ref()
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn is_selected(&self, chat_id: &ChatId) -> bool {
        self.selected.as_ref() == Some(chat_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use parley_shared::{UserId, UsersHash};
    use parley_store::Database;

    use super::*;

    fn state() -> LocalState {
        LocalState::new(Arc::new(Mutex::new(Database::open_in_memory().unwrap())))
    }

    fn chat(id: &str, other: &str) -> Chat {
        let participant_ids = vec![UserId::from("me"), UserId::from(other)];
        Chat {
            id: id.into(),
            chat_name: "Sender".into(),
            users_hash: UsersHash::from_participants(&participant_ids),
            participant_ids,
            is_group_chat: false,
            latest_message_id: None,
            created_at: Utc::now(),
        }
    }

    fn ids(directory: &ChatDirectory) -> Vec<&str> {
        directory.chats().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_upsert_prepends_new_and_replaces_known() {
        let mut directory = ChatDirectory::new(state());
        directory.load(vec![chat("a", "u1"), chat("b", "u2")]);

        assert!(directory.upsert(chat("c", "u3")));
        assert_eq!(ids(&directory), vec!["c", "a", "b"]);

        let mut renamed = chat("b", "u2");
        renamed.chat_name = "Renamed".into();
        assert!(!directory.upsert(renamed));
        assert_eq!(ids(&directory), vec!["c", "a", "b"]);
        assert_eq!(directory.get(&"b".into()).unwrap().chat_name, "Renamed");
    }

    #[test]
    fn test_touch_moves_chat_to_front() {
        let mut directory = ChatDirectory::new(state());
        directory.load(vec![chat("a", "u1"), chat("b", "u2")]);

        assert!(directory.touch(&"b".into(), &"m9".into()));
        assert_eq!(ids(&directory), vec!["b", "a"]);
        assert_eq!(
            directory.get(&"b".into()).unwrap().latest_message_id,
            Some("m9".into())
        );
        assert!(!directory.touch(&"zz".into(), &"m1".into()));
    }

    #[test]
    fn test_selection_survives_reload_through_local_state() {
        let state = state();
        let mut directory = ChatDirectory::new(state.clone());
        directory.load(vec![chat("a", "u1"), chat("b", "u2")]);
        directory.select(&"b".into()).unwrap();

        let mut restarted = ChatDirectory::new(state);
        assert!(restarted.load(vec![chat("a", "u1"), chat("b", "u2")]));
        assert_eq!(restarted.selected_id(), Some(&ChatId::from("b")));
    }

    #[test]
    fn test_page_mount_clears_selection() {
        let state = state();
        let mut directory = ChatDirectory::new(state.clone());
        directory.load(vec![chat("a", "u1")]);
        directory.select(&"a".into()).unwrap();

        directory.page_mounted();
        assert!(directory.selected_chat().is_none());
        assert!(state.selected_chat().is_none());
    }

    #[test]
    fn test_select_unknown_chat_fails() {
        let mut directory = ChatDirectory::new(state());
        assert!(matches!(
            directory.select(&"nope".into()),
            Err(ClientError::UnknownChat(_))
        ));
    }
}
