//! The chat session: one owner for every piece of chat state.
//!
//! All mutation happens on the session's own loop. Backend calls are spawned
//! and come back as [`TaskOutcome`]s tagged with the chat (or load ticket)
//! they were started for, so a late answer cannot land in the wrong chat.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use parley_net::{NetError, TransportHandle, TransportNotification};
use parley_shared::{
    Chat, ChatId, ConnectionState, Message, NewMessage, ServerEvent, User, UserId,
};

use crate::backend::ChatBackend;
use crate::chat_lookup::get_or_create_chat;
use crate::directory::ChatDirectory;
use crate::error::{ClientError, Result};
use crate::events::{ChatEvent, SoundCue};
use crate::history::{Appended, LoadTicket, LocalId, MessageHistory, Settled};
use crate::notifications::{Inbound, NotificationAggregator};
use crate::receiver::{ReceiverResolver, Resolution};
use crate::storage::LocalState;
use crate::typing::{TypingController, TypingSignal};

/// Requests from the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    RefreshChats,
    SelectChat(ChatId),
    OpenChatWith(UserId),
    Keystroke,
    Send(String),
    RetrySend(LocalId),
    DiscardSend(LocalId),
    UserInteracted,
    PageMounted,
    Shutdown,
}

/// Result of a spawned backend call.
#[derive(Debug)]
pub enum TaskOutcome {
    ChatsLoaded(Result<Vec<Chat>>),
    HistoryLoaded {
        ticket: LoadTicket,
        result: Result<Vec<Message>>,
    },
    ReceiverResolved {
        chat_id: ChatId,
        user: Option<User>,
    },
    MessageCreated {
        local_id: LocalId,
        chat_id: ChatId,
        content: String,
        result: Result<Message>,
    },
    ChatOpened(Result<Chat>),
}

/// Receiving ends handed out by [`ChatSession::new`].
#[derive(Debug)]
pub struct SessionChannels {
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
    pub tasks: mpsc::UnboundedReceiver<TaskOutcome>,
}

pub struct ChatSession {
    user: User,
    backend: Arc<dyn ChatBackend>,
    transport: TransportHandle,

    directory: ChatDirectory,
    receivers: ReceiverResolver,
    history: MessageHistory,
    notifications: NotificationAggregator,
    typing: TypingController,
    peer_typing: bool,

    connection: ConnectionState,
    /// Set after the first `Connected`; later ones are reconnects.
    has_connected: bool,

    events: mpsc::UnboundedSender<ChatEvent>,
    tasks: mpsc::UnboundedSender<TaskOutcome>,
}

impl ChatSession {
    pub fn new(
        user: User,
        backend: Arc<dyn ChatBackend>,
        transport: TransportHandle,
        state: LocalState,
        typing_timeout: Duration,
    ) -> (Self, SessionChannels) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();

        let session = Self {
            user,
            backend,
            connection: transport.state(),
            transport,
            directory: ChatDirectory::new(state.clone()),
            receivers: ReceiverResolver::new(),
            history: MessageHistory::new(),
            notifications: NotificationAggregator::new(state),
            typing: TypingController::new(typing_timeout),
            peer_typing: false,
            has_connected: false,
            events: events_tx,
            tasks: tasks_tx,
        };
        let channels = SessionChannels {
            events: events_rx,
            tasks: tasks_rx,
        };
        (session, channels)
    }

    /// Publish the restored unread queue and fetch the chat list.
    pub fn start(&mut self) {
        info!(user = %self.user.id, "Chat session started");
        if !self.notifications.is_empty() {
            self.emit(ChatEvent::NotificationsChanged {
                unread: self.notifications.len(),
            });
        }
        self.refresh_chats();
    }

    /// Returns `false` once the session should stop.
    pub fn handle_command(&mut self, command: SessionCommand) -> bool {
        let result = match command {
            SessionCommand::RefreshChats => {
                self.refresh_chats();
                Ok(())
            }
            SessionCommand::SelectChat(chat_id) => self.select_chat(&chat_id),
            SessionCommand::OpenChatWith(user_id) => {
                self.open_chat_with(user_id);
                Ok(())
            }
            SessionCommand::Keystroke => {
                self.keystroke(Instant::now());
                Ok(())
            }
            SessionCommand::Send(content) => self.send(&content).map(|_| ()),
            SessionCommand::RetrySend(local_id) => self.retry_send(local_id),
            SessionCommand::DiscardSend(local_id) => self.discard_send(local_id).map(|_| ()),
            SessionCommand::UserInteracted => {
                self.user_interacted();
                Ok(())
            }
            SessionCommand::PageMounted => {
                self.page_mounted();
                Ok(())
            }
            SessionCommand::Shutdown => return false,
        };

        if let Err(e) = result {
            debug!(error = %e, "Command rejected");
            self.emit(ChatEvent::Notice(e.to_string()));
        }
        true
    }

    // ------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------

    pub fn refresh_chats(&mut self) {
        let backend = self.backend.clone();
        let user_id = self.user.id.clone();
        self.spawn(async move {
            TaskOutcome::ChatsLoaded(backend.fetch_chats_for_user(&user_id).await)
        });
    }

    pub fn select_chat(&mut self, chat_id: &ChatId) -> Result<()> {
        if !self.directory.contains(chat_id) {
            return Err(ClientError::UnknownChat(chat_id.clone()));
        }
        self.leave_typing();
        let chat = self.directory.select(chat_id)?.clone();
        self.activate(chat);
        Ok(())
    }

    /// Open the chat with `other`, creating it if needed.
    pub fn open_chat_with(&mut self, other: UserId) {
        let backend = self.backend.clone();
        let current = self.user.id.clone();
        self.spawn(async move {
            TaskOutcome::ChatOpened(get_or_create_chat(backend.as_ref(), &current, &other).await)
        });
    }

    pub fn page_mounted(&mut self) {
        self.leave_typing();
        self.directory.page_mounted();
        self.history.clear();
        self.set_peer_typing(false);
        self.emit(ChatEvent::SelectionChanged(None));
        self.emit(ChatEvent::HistoryChanged);
    }

    /// Load, join and clear unread for an already selected chat.
    fn activate(&mut self, chat: Chat) {
        debug!(chat = %chat.id, "Activating chat");
        self.set_peer_typing(false);

        let ticket = self.history.begin_load(&chat.id);
        self.load_history(ticket);

        if let Err(e) = self.transport.join_room(&chat.id) {
            warn!(chat = %chat.id, error = %e, "Failed to queue room join");
        }

        let cleared = self.notifications.clear_chat(&chat.id);

        self.emit(ChatEvent::SelectionChanged(Some(chat.id.clone())));
        self.emit(ChatEvent::HistoryChanged);
        if cleared > 0 {
            self.emit(ChatEvent::NotificationsChanged {
                unread: self.notifications.len(),
            });
        }
        self.resolve_receiver(&chat);
    }

    fn load_history(&self, ticket: LoadTicket) {
        let backend = self.backend.clone();
        self.spawn(async move {
            let result = backend.fetch_messages_for_chat(ticket.chat_id()).await;
            TaskOutcome::HistoryLoaded { ticket, result }
        });
    }

    fn resolve_receiver(&mut self, chat: &Chat) {
        match self
            .receivers
            .resolve(self.backend.clone(), &self.user.id, chat)
        {
            Resolution::Cached(user) => self.emit(ChatEvent::ReceiverResolved {
                chat_id: chat.id.clone(),
                name: user.name,
            }),
            Resolution::InFlight => {}
            Resolution::Started(lookup) => {
                let chat_id = chat.id.clone();
                self.spawn(async move {
                    let user = lookup.await;
                    TaskOutcome::ReceiverResolved { chat_id, user }
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Composing and sending
    // ------------------------------------------------------------------

    /// Keystrokes only count while the realtime connection is up.
    pub fn keystroke(&mut self, now: Instant) {
        if !self.transport.is_ready() {
            return;
        }
        let Some(chat_id) = self.history.active_chat().cloned() else {
            return;
        };
        if let Some(TypingSignal::Start) = self.typing.on_keystroke(now) {
            quiet(self.transport.emit_typing(&chat_id), "typing");
        }
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    pub fn on_typing_deadline(&mut self, now: Instant) {
        if let Some(TypingSignal::Stop) = self.typing.on_deadline(now) {
            if let Some(chat_id) = self.history.active_chat() {
                quiet(self.transport.emit_stop_typing(chat_id), "stop typing");
            }
        }
    }

    /// Show the message immediately and store it in the background.
    pub fn send(&mut self, content: &str) -> Result<LocalId> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let chat_id = self
            .directory
            .selected_id()
            .cloned()
            .ok_or(ClientError::NoChatSelected)?;

        if let Some(TypingSignal::Stop) = self.typing.on_send() {
            quiet(self.transport.emit_stop_typing(&chat_id), "stop typing");
        }

        let local_id = self
            .history
            .push_pending(content, &self.user, Utc::now())
            .ok_or(ClientError::NoChatSelected)?;
        self.emit(ChatEvent::HistoryChanged);

        self.dispatch_create(local_id, chat_id, content.to_string());
        Ok(local_id)
    }

    pub fn retry_send(&mut self, local_id: LocalId) -> Result<()> {
        let content = self
            .history
            .retry(local_id)
            .ok_or(ClientError::UnknownPending)?;
        let chat_id = self
            .history
            .active_chat()
            .cloned()
            .ok_or(ClientError::NoChatSelected)?;
        self.emit(ChatEvent::HistoryChanged);
        self.dispatch_create(local_id, chat_id, content);
        Ok(())
    }

    /// Drop a failed send and hand its text back to the compose box.
    pub fn discard_send(&mut self, local_id: LocalId) -> Result<String> {
        let content = self
            .history
            .discard(local_id)
            .ok_or(ClientError::UnknownPending)?;
        self.emit(ChatEvent::HistoryChanged);
        self.emit(ChatEvent::ComposeRestored(content.clone()));
        Ok(content)
    }

    fn dispatch_create(&self, local_id: LocalId, chat_id: ChatId, content: String) {
        let backend = self.backend.clone();
        let new_message = NewMessage {
            content: content.clone(),
            sender: self.user.id.clone(),
            chat: chat_id.clone(),
            timestamp: Utc::now(),
        };
        self.spawn(async move {
            let result = backend.create_message(&new_message).await;
            TaskOutcome::MessageCreated {
                local_id,
                chat_id,
                content,
                result,
            }
        });
    }

    pub fn user_interacted(&mut self) {
        self.notifications.mark_user_interacted();
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    pub fn handle_transport(&mut self, notification: TransportNotification) {
        match notification {
            TransportNotification::StateChanged(state) => self.on_connection(state),
            TransportNotification::Event(ServerEvent::MessageReceived(message)) => {
                self.on_message(message)
            }
            TransportNotification::Event(ServerEvent::Typing(chat_id)) => {
                if self.directory.is_selected(&chat_id) {
                    self.set_peer_typing(true);
                }
            }
            TransportNotification::Event(ServerEvent::StopTyping(chat_id)) => {
                if self.directory.is_selected(&chat_id) {
                    self.set_peer_typing(false);
                }
            }
            TransportNotification::Event(ServerEvent::Connected) => {}
        }
    }

    fn on_connection(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }
        self.connection = state;
        self.emit(ChatEvent::Connection(state));

        match state {
            ConnectionState::Connected => {
                if self.has_connected {
                    info!("Reconnected, reconciling history");
                    if let Some(ticket) = self.history.begin_refresh() {
                        self.load_history(ticket);
                    }
                    self.refresh_chats();
                }
                self.has_connected = true;
            }
            ConnectionState::Disconnected => {
                self.typing.reset();
                self.set_peer_typing(false);
            }
            ConnectionState::Connecting => {}
        }
    }

    fn on_message(&mut self, message: Message) {
        let chat_id = message.chat_id.clone();
        let message_id = message.id.clone();

        if self.directory.is_selected(&chat_id) {
            if self.history.append(message) != Appended::Added {
                return;
            }
            self.emit(ChatEvent::HistoryChanged);
            self.emit(ChatEvent::Sound(SoundCue::Receive));
        } else {
            match self.notifications.on_inbound(message) {
                Inbound::Duplicate => return,
                Inbound::Queued(alert) => {
                    self.emit(ChatEvent::NotificationsChanged {
                        unread: self.notifications.len(),
                    });
                    if let Some(alert) = alert {
                        self.emit(ChatEvent::Alert(alert));
                        self.emit(ChatEvent::Sound(SoundCue::Notification));
                    }
                }
            }
        }

        if self.directory.touch(&chat_id, &message_id) {
            self.emit(ChatEvent::ChatsUpdated);
        } else {
            debug!(chat = %chat_id, "Message for unknown chat, refreshing directory");
            self.refresh_chats();
        }
    }

    pub fn handle_task(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::ChatsLoaded(Ok(chats)) => self.on_chats_loaded(chats),
            TaskOutcome::ChatsLoaded(Err(e)) => {
                warn!(error = %e, "Failed to fetch chats");
                self.emit(ChatEvent::Notice("Failed to load the chats".to_string()));
            }

            TaskOutcome::HistoryLoaded { ticket, result } => match result {
                Ok(messages) => {
                    if self.history.complete_load(&ticket, messages).is_some() {
                        self.emit(ChatEvent::HistoryChanged);
                    }
                }
                Err(e) if self.history.is_current(&ticket) => {
                    warn!(chat = %ticket.chat_id(), error = %e, "Failed to fetch messages");
                    self.emit(ChatEvent::Notice("Failed to load the messages".to_string()));
                }
                Err(e) => debug!(chat = %ticket.chat_id(), error = %e, "Stale fetch failed"),
            },

            TaskOutcome::ReceiverResolved { chat_id, user } => {
                self.receivers.finish(&chat_id, user);
                self.emit(ChatEvent::ReceiverResolved {
                    name: self.receivers.display_name(&chat_id).to_string(),
                    chat_id,
                });
            }

            TaskOutcome::MessageCreated {
                local_id,
                chat_id,
                content,
                result,
            } => self.on_message_created(local_id, chat_id, content, result),

            TaskOutcome::ChatOpened(Ok(chat)) => {
                let chat_id = chat.id.clone();
                if self.directory.upsert(chat) {
                    self.emit(ChatEvent::ChatsUpdated);
                }
                if let Err(e) = self.select_chat(&chat_id) {
                    warn!(chat = %chat_id, error = %e, "Opened chat could not be selected");
                }
            }
            TaskOutcome::ChatOpened(Err(e)) => {
                warn!(error = %e, "Chat creation failed");
                self.emit(ChatEvent::Notice(
                    "Create chat failed. Please try again.".to_string(),
                ));
            }
        }
    }

    fn on_chats_loaded(&mut self, chats: Vec<Chat>) {
        let had_selection = self.directory.selected_id().is_some();
        let restored = self.directory.load(chats);
        self.receivers
            .retain(self.directory.chats().iter().map(|c| &c.id));
        self.emit(ChatEvent::ChatsUpdated);

        if had_selection && self.directory.selected_id().is_none() {
            self.history.clear();
            self.emit(ChatEvent::SelectionChanged(None));
            self.emit(ChatEvent::HistoryChanged);
        }

        let chats: Vec<Chat> = self.directory.chats().to_vec();
        for chat in &chats {
            self.resolve_receiver(chat);
        }

        if restored {
            if let Some(chat) = self.directory.selected_chat().cloned() {
                self.activate(chat);
            }
        }
    }

    fn on_message_created(
        &mut self,
        local_id: LocalId,
        chat_id: ChatId,
        content: String,
        result: Result<Message>,
    ) {
        match result {
            Ok(message) => {
                debug!(message = %message.id, chat = %chat_id, "Message stored");
                quiet(self.transport.broadcast_message(&message), "new message");
                let message_id = message.id.clone();
                let shown = match self.history.confirm(local_id, message.clone()) {
                    Settled::Visible => true,
                    // The optimistic entry is gone but its chat may be open
                    // again with a fetch that predates the insert.
                    Settled::Outbox | Settled::Missing => {
                        self.history.append(message) == Appended::Added
                    }
                };
                if shown {
                    self.emit(ChatEvent::HistoryChanged);
                }
                if self.directory.touch(&chat_id, &message_id) {
                    self.emit(ChatEvent::ChatsUpdated);
                }
                self.emit(ChatEvent::Sound(SoundCue::Sent));
            }
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "Failed to send message");
                match self.history.fail(local_id) {
                    Settled::Visible => self.emit(ChatEvent::HistoryChanged),
                    Settled::Outbox => {
                        debug!(chat = %chat_id, local = %local_id, "Failed send kept for its chat")
                    }
                    Settled::Missing => self.emit(ChatEvent::ComposeRestored(content)),
                }
                self.emit(ChatEvent::Notice(
                    "Failed to send the message. Please try again.".to_string(),
                ));
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Stop typing in the chat being left.
    fn leave_typing(&mut self) {
        if let Some(TypingSignal::Stop) = self.typing.reset() {
            if let Some(chat_id) = self.history.active_chat() {
                quiet(self.transport.emit_stop_typing(chat_id), "stop typing");
            }
        }
    }

    fn set_peer_typing(&mut self, typing: bool) {
        if self.peer_typing == typing {
            return;
        }
        self.peer_typing = typing;
        if let Some(chat_id) = self.directory.selected_id().cloned() {
            self.emit(ChatEvent::PeerTyping { chat_id, typing });
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let _ = tasks.send(task.await);
        });
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    pub async fn shutdown(&mut self) {
        self.leave_typing();
        if let Err(e) = self.transport.shutdown().await {
            debug!(error = %e, "Transport already stopped");
        }
        info!(user = %self.user.id, "Chat session ended");
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    pub fn directory(&self) -> &ChatDirectory {
        &self.directory
    }

    pub fn receivers(&self) -> &ReceiverResolver {
        &self.receivers
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn notifications(&self) -> &NotificationAggregator {
        &self.notifications
    }

    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }
}

/// Fire-and-forget emits only log when they cannot be queued.
fn quiet(result: std::result::Result<(), NetError>, what: &str) {
    if let Err(e) = result {
        debug!(event = what, error = %e, "Event not sent");
    }
}
