//! Browser-storage style blobs: the selected chat and the unread queue.
//!
//! These are a convenience cache, not a source of truth. Failures are logged
//! and treated as "nothing stored"; a corrupt blob is removed.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use parley_shared::constants::{NOTIFICATION_KEY, SELECTED_CHAT_KEY};
use parley_shared::{Chat, Notification};
use parley_store::{Database, StoreError};

#[derive(Debug, Clone)]
pub struct LocalState {
    db: Arc<Mutex<Database>>,
}

impl LocalState {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn selected_chat(&self) -> Option<Chat> {
        self.load(SELECTED_CHAT_KEY)
    }

    pub fn store_selected_chat(&self, chat: &Chat) {
        self.store(SELECTED_CHAT_KEY, chat);
    }

    pub fn clear_selected_chat(&self) {
        if let Err(e) = self.lock().remove_local_state(SELECTED_CHAT_KEY) {
            warn!(key = SELECTED_CHAT_KEY, error = %e, "Failed to clear local state");
        }
    }

    /// Persisted unread queue, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.load(NOTIFICATION_KEY).unwrap_or_default()
    }

    pub fn store_notifications(&self, queue: &[Notification]) {
        self.store(NOTIFICATION_KEY, &queue);
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let db = self.lock();
        match db.load_json(key) {
            Ok(value) => value,
            Err(StoreError::Json(e)) => {
                warn!(key, error = %e, "Discarding corrupt local state");
                if let Err(e) = db.remove_local_state(key) {
                    warn!(key, error = %e, "Failed to remove corrupt local state");
                }
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read local state");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.lock().store_json(key, value) {
            warn!(key, error = %e, "Failed to write local state");
        }
    }
}
