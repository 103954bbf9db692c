//! Unread messages for chats that are not on screen.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use parley_shared::{ChatId, Message, MessageId, Notification};

use crate::storage::LocalState;

/// What the UI should pop up for a queued notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub chat_id: ChatId,
    pub title: String,
    pub sender_name: String,
    pub sender_image: Option<String>,
    pub body: String,
}

impl Alert {
    fn for_message(message: &Message) -> Self {
        Self {
            chat_id: message.chat_id.clone(),
            title: "New Message".to_string(),
            sender_name: message.sender.name.clone(),
            sender_image: message.sender.image_url.clone(),
            body: message.content.clone(),
        }
    }
}

/// How many delivered message ids are remembered for replay detection.
const SEEN_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Already queued or already seen.
    Duplicate,
    /// Queued; carries an alert once the user has interacted with the page.
    Queued(Option<Alert>),
}

#[derive(Debug)]
pub struct NotificationAggregator {
    /// Newest first.
    queue: Vec<Notification>,
    /// Recently delivered ids, oldest at the front of `seen_order`.
    seen: HashSet<MessageId>,
    seen_order: VecDeque<MessageId>,
    user_interacted: bool,
    state: LocalState,
}

impl NotificationAggregator {
    /// Start from whatever queue was persisted.
    pub fn new(state: LocalState) -> Self {
        let mut aggregator = Self {
            queue: Vec::new(),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            user_interacted: false,
            state,
        };
        let persisted = aggregator.state.notifications();
        aggregator.restore(persisted);
        aggregator
    }

    /// Replace the in-memory queue without writing it back.
    pub fn restore(&mut self, persisted: Vec<Notification>) {
        self.seen.clear();
        self.seen_order.clear();
        for notification in persisted.iter().rev() {
            self.remember(&notification.message.id);
        }
        self.queue = persisted;
        debug!(count = self.queue.len(), "Notification queue restored");
    }

    pub fn on_inbound(&mut self, message: Message) -> Inbound {
        if self.seen.contains(&message.id) || self.is_queued(&message.id) {
            return Inbound::Duplicate;
        }
        self.remember(&message.id);

        let alert = self.user_interacted.then(|| Alert::for_message(&message));
        self.queue.insert(0, Notification { message });
        self.persist();
        Inbound::Queued(alert)
    }

    /// Drop every queued notification for `chat_id`. Returns how many went.
    pub fn clear_chat(&mut self, chat_id: &ChatId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|n| n.chat_id() != chat_id);
        let removed = before - self.queue.len();
        if removed > 0 {
            self.persist();
        }
        removed
    }

    pub fn mark_user_interacted(&mut self) {
        self.user_interacted = true;
    }

    pub fn user_interacted(&self) -> bool {
        self.user_interacted
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.queue
    }

    pub fn unread_for(&self, chat_id: &ChatId) -> usize {
        self.queue.iter().filter(|n| n.chat_id() == chat_id).count()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn is_queued(&self, id: &MessageId) -> bool {
        self.queue.iter().any(|n| &n.message.id == id)
    }

    fn remember(&mut self, id: &MessageId) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.seen_order.push_back(id.clone());
        while self.seen_order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    fn persist(&self) {
        self.state.store_notifications(&self.queue);
    }
}
