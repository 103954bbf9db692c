//! Who is on the other end of a two-party chat.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use parley_shared::constants::RECEIVER_PLACEHOLDER;
use parley_shared::{Chat, ChatId, User, UserId};

use crate::backend::ChatBackend;

/// The participant that is not `current`.
///
/// Only defined for exactly two participants. A self-chat resolves to the
/// second entry.
pub fn other_participant<'a>(current: &UserId, participant_ids: &'a [UserId]) -> Option<&'a UserId> {
    match participant_ids {
        [first, second] => Some(if first == current { second } else { first }),
        _ => None,
    }
}

/// Fetch the other participant's profile. Failures are logged and yield
/// `None`.
pub async fn lookup_receiver(
    backend: &dyn ChatBackend,
    current: &UserId,
    participant_ids: &[UserId],
) -> Option<User> {
    let other = other_participant(current, participant_ids)?;
    match backend.get_user_by_id(other).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            debug!(user = %other, "Receiver does not exist");
            None
        }
        Err(e) => {
            warn!(user = %other, error = %e, "Receiver lookup failed");
            None
        }
    }
}

/// A lookup to run off the session loop; feed its output to
/// [`ReceiverResolver::finish`].
pub type ReceiverLookup = Pin<Box<dyn Future<Output = Option<User>> + Send>>;

pub enum Resolution {
    Cached(User),
    /// A lookup for this chat is already running.
    InFlight,
    Started(ReceiverLookup),
}

/// Per-chat cache of resolved receivers.
#[derive(Debug, Default)]
pub struct ReceiverResolver {
    cache: HashMap<ChatId, User>,
    in_flight: HashSet<ChatId>,
}

impl ReceiverResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache hit, or a lookup to run. At most one lookup per chat is handed
    /// out until [`Self::finish`] is called for it.
    pub fn resolve(
        &mut self,
        backend: Arc<dyn ChatBackend>,
        current: &UserId,
        chat: &Chat,
    ) -> Resolution {
        if let Some(user) = self.cache.get(&chat.id) {
            return Resolution::Cached(user.clone());
        }
        if !self.in_flight.insert(chat.id.clone()) {
            return Resolution::InFlight;
        }
        let current = current.clone();
        let participants = chat.participant_ids.clone();
        Resolution::Started(Box::pin(async move {
            lookup_receiver(backend.as_ref(), &current, &participants).await
        }))
    }

    /// Record the result of a lookup handed out by [`Self::resolve`].
    pub fn finish(&mut self, chat_id: &ChatId, user: Option<User>) {
        self.in_flight.remove(chat_id);
        if let Some(user) = user {
            self.cache.insert(chat_id.clone(), user);
        }
    }

    pub fn cached(&self, chat_id: &ChatId) -> Option<&User> {
        self.cache.get(chat_id)
    }

    /// Name to show for the chat's receiver.
    pub fn display_name(&self, chat_id: &ChatId) -> &str {
        self.cache
            .get(chat_id)
            .map(|u| u.name.as_str())
            .unwrap_or(RECEIVER_PLACEHOLDER)
    }

    pub fn invalidate(&mut self, chat_id: &ChatId) -> bool {
        self.cache.remove(chat_id).is_some()
    }

    /// Drop cache entries for chats no longer in the directory.
    pub fn retain<'a, I>(&mut self, chat_ids: I)
    where
        I: IntoIterator<Item = &'a ChatId>,
    {
        let keep: HashSet<&ChatId> = chat_ids.into_iter().collect();
        self.cache.retain(|id, _| keep.contains(id));
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
    }
}
