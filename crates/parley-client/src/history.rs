//! Ordered message list of the active chat.
//!
//! Entries are kept sorted by `created_at`; equal timestamps keep arrival
//! order. Messages are unique by id. Every load is tagged with a
//! [`LoadTicket`] so a response for a chat that is no longer active is
//! dropped instead of populating the wrong conversation.
//!
//! Unconfirmed sends outlive a chat switch: they wait in an outbox and are
//! put back when their chat is loaded again.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use parley_shared::{ChatId, Message, MessageId, User};

/// Client-side handle of an optimistic send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(Uuid);

impl LocalId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Sent optimistically, waiting for the backend.
    Pending,
    Confirmed,
    /// The backend rejected it; the content can be retried or discarded.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message: Message,
    pub status: DeliveryStatus,
    pub local_id: Option<LocalId>,
}

impl HistoryEntry {
    fn confirmed(message: Message) -> Self {
        Self {
            message,
            status: DeliveryStatus::Confirmed,
            local_id: None,
        }
    }
}

/// Proof that a fetch was started for a given chat and load generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    chat_id: ChatId,
    generation: u64,
}

impl LoadTicket {
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }
}

/// Where a send landed when its backend result came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The entry is in the visible list.
    Visible,
    /// The entry belongs to a chat that is not open.
    Outbox,
    /// No entry with that id exists any more.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Added,
    Duplicate,
    /// Not for the active chat; nothing was stored.
    OtherChat,
}

#[derive(Debug, Default)]
pub struct MessageHistory {
    active: Option<ChatId>,
    entries: Vec<HistoryEntry>,
    /// Pending and failed sends of chats that are not open.
    outbox: Vec<HistoryEntry>,
    generation: u64,
    loading: bool,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `chat_id` and invalidate older tickets. The list starts
    /// with that chat's unconfirmed sends only.
    pub fn begin_load(&mut self, chat_id: &ChatId) -> LoadTicket {
        self.park();
        self.active = Some(chat_id.clone());
        let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outbox)
            .into_iter()
            .partition(|e| &e.message.chat_id == chat_id);
        self.outbox = rest;
        for entry in mine {
            self.insert_ordered(entry);
        }
        self.generation += 1;
        self.loading = true;
        LoadTicket {
            chat_id: chat_id.clone(),
            generation: self.generation,
        }
    }

    /// Ticket for re-fetching the active chat without clearing it, used after
    /// a reconnect.
    pub fn begin_refresh(&mut self) -> Option<LoadTicket> {
        let chat_id = self.active.clone()?;
        self.generation += 1;
        Some(LoadTicket {
            chat_id,
            generation: self.generation,
        })
    }

    /// Apply a fetch result. Returns `None` for a stale ticket, otherwise the
    /// number of messages added.
    pub fn complete_load(&mut self, ticket: &LoadTicket, fetched: Vec<Message>) -> Option<usize> {
        if !self.is_current(ticket) {
            debug!(chat = %ticket.chat_id, "Dropping stale history response");
            return None;
        }
        self.loading = false;
        Some(self.reconcile(fetched))
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.generation == self.generation && self.active.as_ref() == Some(&ticket.chat_id)
    }

    /// Merge fetched messages into the list by id. Known ids are refreshed in
    /// place; foreign-chat messages are ignored. Returns how many were added.
    pub fn reconcile(&mut self, fetched: Vec<Message>) -> usize {
        let Some(active) = self.active.clone() else {
            return 0;
        };
        let mut added = 0;
        for message in fetched.into_iter().filter(|m| m.chat_id == active) {
            match self.position(&message.id) {
                Some(pos) => self.entries[pos].message = message,
                None => {
                    self.insert_ordered(HistoryEntry::confirmed(message));
                    added += 1;
                }
            }
        }
        added
    }

    /// Add a live message.
    pub fn append(&mut self, message: Message) -> Appended {
        if self.active.as_ref() != Some(&message.chat_id) {
            return Appended::OtherChat;
        }
        if self.contains(&message.id) {
            return Appended::Duplicate;
        }
        self.insert_ordered(HistoryEntry::confirmed(message));
        Appended::Added
    }

    /// Show an outgoing message before the backend has stored it. `None`
    /// without an active chat.
    pub fn push_pending(
        &mut self,
        content: &str,
        sender: &User,
        now: DateTime<Utc>,
    ) -> Option<LocalId> {
        let chat_id = self.active.clone()?;
        let local_id = LocalId::generate();
        let message = Message {
            id: MessageId::new(format!("local-{local_id}")),
            content: content.to_string(),
            sender: sender.clone(),
            chat_id,
            created_at: now,
            is_deleted: false,
        };
        self.insert_ordered(HistoryEntry {
            message,
            status: DeliveryStatus::Pending,
            local_id: Some(local_id),
        });
        Some(local_id)
    }

    /// Replace the optimistic entry with the stored message. If the stored
    /// message is already present the optimistic entry is dropped. A send
    /// confirmed while its chat is closed just leaves the outbox; the stored
    /// message comes back with the next load.
    pub fn confirm(&mut self, local_id: LocalId, message: Message) -> Settled {
        if let Some(pos) = self.local_position(local_id) {
            self.entries.remove(pos);
            if !self.contains(&message.id) {
                self.insert_ordered(HistoryEntry::confirmed(message));
            }
            return Settled::Visible;
        }
        match self.outbox_position(local_id) {
            Some(pos) => {
                self.outbox.remove(pos);
                Settled::Outbox
            }
            None => Settled::Missing,
        }
    }

    pub fn fail(&mut self, local_id: LocalId) -> Settled {
        if let Some(pos) = self.local_position(local_id) {
            self.entries[pos].status = DeliveryStatus::Failed;
            return Settled::Visible;
        }
        match self.outbox_position(local_id) {
            Some(pos) => {
                self.outbox[pos].status = DeliveryStatus::Failed;
                Settled::Outbox
            }
            None => Settled::Missing,
        }
    }

    /// Put a failed entry back to pending and hand out its content to resend.
    pub fn retry(&mut self, local_id: LocalId) -> Option<String> {
        let pos = self.local_position(local_id)?;
        let entry = &mut self.entries[pos];
        if entry.status != DeliveryStatus::Failed {
            return None;
        }
        entry.status = DeliveryStatus::Pending;
        Some(entry.message.content.clone())
    }

    /// Remove a failed entry, returning its content.
    pub fn discard(&mut self, local_id: LocalId) -> Option<String> {
        let pos = self.local_position(local_id)?;
        if self.entries[pos].status != DeliveryStatus::Failed {
            return None;
        }
        Some(self.entries.remove(pos).message.content)
    }

    /// Close the active chat, e.g. when the selection is cleared. Its
    /// unconfirmed sends move to the outbox.
    pub fn clear(&mut self) {
        self.park();
        self.active = None;
        self.generation += 1;
        self.loading = false;
    }

    pub fn active_chat(&self) -> Option<&ChatId> {
        self.active.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn entry(&self, local_id: LocalId) -> Option<&HistoryEntry> {
        self.local_position(local_id).map(|pos| &self.entries[pos])
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unconfirmed sends waiting for a chat that is not open.
    pub fn outbox(&self) -> &[HistoryEntry] {
        &self.outbox
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|e| &e.message.id == id)
    }

    fn local_position(&self, local_id: LocalId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.local_id == Some(local_id))
    }

    fn outbox_position(&self, local_id: LocalId) -> Option<usize> {
        self.outbox.iter().position(|e| e.local_id == Some(local_id))
    }

    /// Move unconfirmed entries to the outbox and empty the list.
    fn park(&mut self) {
        self.outbox.extend(
            self.entries
                .drain(..)
                .filter(|e| e.status != DeliveryStatus::Confirmed),
        );
    }

    fn insert_ordered(&mut self, entry: HistoryEntry) {
        let at = self
            .entries
            .iter()
            .rposition(|e| e.message.created_at <= entry.message.created_at)
            .map_or(0, |i| i + 1);
        self.entries.insert(at, entry);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            name: id.to_uppercase(),
            username: id.to_string(),
            image_url: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(id: &str, chat: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            content: format!("content of {id}"),
            sender: user("u2"),
            chat_id: chat.into(),
            created_at: at(secs),
            is_deleted: false,
        }
    }

    fn ids(history: &MessageHistory) -> Vec<&str> {
        history.messages().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_append_orders_by_timestamp_with_ties_in_arrival_order() {
        let mut history = MessageHistory::new();
        history.begin_load(&"c1".into());

        history.append(message("m3", "c1", 30));
        history.append(message("m1", "c1", 10));
        history.append(message("m2a", "c1", 20));
        history.append(message("m2b", "c1", 20));

        assert_eq!(ids(&history), vec!["m1", "m2a", "m2b", "m3"]);
    }

    #[test]
    fn test_append_skips_duplicates_and_other_chats() {
        let mut history = MessageHistory::new();
        history.begin_load(&"c1".into());

        assert_eq!(history.append(message("m1", "c1", 1)), Appended::Added);
        assert_eq!(history.append(message("m1", "c1", 1)), Appended::Duplicate);
        assert_eq!(history.append(message("m2", "c2", 2)), Appended::OtherChat);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut history = MessageHistory::new();
        let old = history.begin_load(&"x".into());
        let current = history.begin_load(&"y".into());

        assert_eq!(history.complete_load(&old, vec![message("mx", "x", 1)]), None);
        assert!(history.is_empty());

        assert_eq!(
            history.complete_load(&current, vec![message("my", "y", 1)]),
            Some(1)
        );
        assert_eq!(ids(&history), vec!["my"]);
        assert!(!history.is_loading());
    }

    #[test]
    fn test_load_merges_with_live_messages() {
        let mut history = MessageHistory::new();
        let ticket = history.begin_load(&"c1".into());

        // Arrived over the socket while the fetch was in flight.
        history.append(message("m3", "c1", 3));

        let added = history.complete_load(
            &ticket,
            vec![
                message("m1", "c1", 1),
                message("m3", "c1", 3),
                message("other", "c2", 2),
            ],
        );
        assert_eq!(added, Some(1));
        assert_eq!(ids(&history), vec!["m1", "m3"]);
    }

    #[test]
    fn test_refresh_keeps_entries() {
        let mut history = MessageHistory::new();
        let first = history.begin_load(&"c1".into());
        history.complete_load(&first, vec![message("m1", "c1", 1)]);

        let refresh = history.begin_refresh().unwrap();
        assert!(!history.is_current(&first));
        history.complete_load(&refresh, vec![message("m1", "c1", 1), message("m2", "c1", 2)]);
        assert_eq!(ids(&history), vec!["m1", "m2"]);
    }

    #[test]
    fn test_pending_confirm_and_echo() {
        let me = user("u1");
        let mut history = MessageHistory::new();
        history.begin_load(&"c1".into());

        let a = history.push_pending("first", &me, at(5)).unwrap();
        let b = history.push_pending("second", &me, at(6)).unwrap();
        assert_eq!(history.entry(a).unwrap().status, DeliveryStatus::Pending);

        assert_eq!(history.confirm(a, message("s1", "c1", 5)), Settled::Visible);

        // Echo of the second send beats the confirmation.
        history.append(message("s2", "c1", 6));
        assert_eq!(history.confirm(b, message("s2", "c1", 6)), Settled::Visible);

        assert_eq!(ids(&history), vec!["s1", "s2"]);
        assert!(history
            .entries()
            .iter()
            .all(|e| e.status == DeliveryStatus::Confirmed));
        assert_eq!(history.confirm(a, message("s1", "c1", 5)), Settled::Missing);
    }

    #[test]
    fn test_failed_send_retry_and_discard() {
        let me = user("u1");
        let mut history = MessageHistory::new();
        history.begin_load(&"c1".into());

        let id = history.push_pending("oops", &me, at(1)).unwrap();
        assert_eq!(history.retry(id), None);
        assert_eq!(history.discard(id), None);

        assert_eq!(history.fail(id), Settled::Visible);
        assert_eq!(history.entry(id).unwrap().status, DeliveryStatus::Failed);

        assert_eq!(history.retry(id).as_deref(), Some("oops"));
        assert_eq!(history.entry(id).unwrap().status, DeliveryStatus::Pending);

        history.fail(id);
        assert_eq!(history.discard(id).as_deref(), Some("oops"));
        assert!(history.is_empty());
    }

    #[test]
    fn test_unconfirmed_sends_survive_chat_switch() {
        let me = user("u1");
        let mut history = MessageHistory::new();
        history.begin_load(&"a".into());
        let pending = history.push_pending("hello", &me, at(5)).unwrap();
        let failed = history.push_pending("draft", &me, at(6)).unwrap();
        history.fail(failed);
        history.append(message("old", "a", 1));

        history.begin_load(&"b".into());
        assert!(history.is_empty());
        assert_eq!(history.outbox().len(), 2);
        assert_eq!(history.fail(failed), Settled::Outbox);
        assert_eq!(history.retry(failed), None);

        let ticket = history.begin_load(&"a".into());
        assert!(history.outbox().is_empty());
        assert_eq!(history.entry(pending).unwrap().status, DeliveryStatus::Pending);
        assert_eq!(history.entry(failed).unwrap().status, DeliveryStatus::Failed);

        history.complete_load(&ticket, vec![message("old", "a", 1)]);
        assert_eq!(ids(&history).len(), 3);
        assert_eq!(history.discard(failed).as_deref(), Some("draft"));
    }

    #[test]
    fn test_confirm_in_outbox_leaves_it() {
        let me = user("u1");
        let mut history = MessageHistory::new();
        history.begin_load(&"a".into());
        let id = history.push_pending("hello", &me, at(5)).unwrap();
        history.clear();

        assert_eq!(history.confirm(id, message("s1", "a", 5)), Settled::Outbox);
        assert!(history.outbox().is_empty());

        history.begin_load(&"a".into());
        assert!(history.is_empty());
    }

    #[test]
    fn test_pending_needs_active_chat() {
        let mut history = MessageHistory::new();
        assert!(history.push_pending("x", &user("u1"), at(1)).is_none());
    }

    #[test]
    fn test_local_id_parses_back() {
        let id = LocalId::generate();
        assert_eq!(id.to_string().parse::<LocalId>().unwrap(), id);
    }
}
