//! Command / notification channels between the application and the
//! connection task.
//!
//! The application holds a cheap-to-clone [`TransportHandle`]; the connection
//! task owns the matching [`TransportEndpoint`].  Inbound events are read
//! through an [`EventSubscription`], of which at most one exists at a time.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use parley_shared::{ChatId, ClientEvent, ConnectionState, Message, ServerEvent};

use crate::error::NetError;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug, Clone)]
pub enum TransportCommand {
    /// Send an event to the server.
    Emit(ClientEvent),
    /// Close the connection and stop reconnecting.
    Shutdown,
}

/// Notifications sent *from* the connection task to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportNotification {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// An event pushed by the server (never the `connected` ack).
    Event(ServerEvent),
}

type Slot = Arc<Mutex<Option<mpsc::Receiver<TransportNotification>>>>;

fn lock_slot(slot: &Slot) -> MutexGuard<'_, Option<mpsc::Receiver<TransportNotification>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Application side of the transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::Sender<TransportCommand>,
    events: Slot,
    state_rx: watch::Receiver<ConnectionState>,
}

/// Connection-task side of the transport.
#[derive(Debug)]
pub struct TransportEndpoint {
    pub cmd_rx: mpsc::Receiver<TransportCommand>,
    pub notif_tx: mpsc::Sender<TransportNotification>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Create a connected handle/endpoint pair.
pub fn channel(capacity: usize) -> (TransportHandle, TransportEndpoint) {
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (notif_tx, notif_rx) = mpsc::channel(capacity);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let handle = TransportHandle {
        cmd_tx,
        events: Arc::new(Mutex::new(Some(notif_rx))),
        state_rx,
    };
    let endpoint = TransportEndpoint {
        cmd_rx,
        notif_tx,
        state_tx,
    };
    (handle, endpoint)
}

impl TransportHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether quiet sends (typing, broadcasts) will go out right now.
    pub fn is_ready(&self) -> bool {
        self.state().is_connected()
    }

    /// Take the inbound event stream.
    ///
    /// Fails with [`NetError::AlreadySubscribed`] while another subscription
    /// is alive; dropping that subscription frees the slot again.
    pub fn subscribe(&self) -> Result<EventSubscription, NetError> {
        let rx = lock_slot(&self.events)
            .take()
            .ok_or(NetError::AlreadySubscribed)?;
        debug!("transport event subscription registered");
        Ok(EventSubscription {
            rx: Some(rx),
            slot: self.events.clone(),
        })
    }

    pub fn join_room(&self, chat_id: &ChatId) -> Result<(), NetError> {
        self.emit(ClientEvent::JoinChat(chat_id.clone()))
    }

    pub fn emit_typing(&self, chat_id: &ChatId) -> Result<(), NetError> {
        self.emit(ClientEvent::Typing(chat_id.clone()))
    }

    pub fn emit_stop_typing(&self, chat_id: &ChatId) -> Result<(), NetError> {
        self.emit(ClientEvent::StopTyping(chat_id.clone()))
    }

    pub fn broadcast_message(&self, message: &Message) -> Result<(), NetError> {
        self.emit(ClientEvent::NewMessage(message.clone()))
    }

    /// Queue an event without waiting. Fire-and-forget from the caller's view.
    pub fn emit(&self, event: ClientEvent) -> Result<(), NetError> {
        self.cmd_tx
            .try_send(TransportCommand::Emit(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("transport command queue full, dropping event");
                    NetError::ChannelFull
                }
                mpsc::error::TrySendError::Closed(_) => NetError::ChannelClosed,
            })
    }

    pub async fn shutdown(&self) -> Result<(), NetError> {
        self.cmd_tx
            .send(TransportCommand::Shutdown)
            .await
            .map_err(|_| NetError::ChannelClosed)
    }
}

impl TransportEndpoint {
    /// Publish a state transition, skipping no-op updates.
    pub async fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(?state, "transport state changed");
            let _ = self
                .notif_tx
                .send(TransportNotification::StateChanged(state))
                .await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// The single live reader of inbound transport events.
#[derive(Debug)]
pub struct EventSubscription {
    rx: Option<mpsc::Receiver<TransportNotification>>,
    slot: Slot,
}

impl EventSubscription {
    /// Next notification; `None` once the connection task has ended.
    pub async fn recv(&mut self) -> Option<TransportNotification> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            *lock_slot(&self.slot) = Some(rx);
            debug!("transport event subscription released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_subscription_is_refused() {
        let (handle, _endpoint) = channel(8);

        let first = handle.subscribe().unwrap();
        assert!(matches!(handle.subscribe(), Err(NetError::AlreadySubscribed)));

        let clone = handle.clone();
        assert!(matches!(clone.subscribe(), Err(NetError::AlreadySubscribed)));

        drop(first);
        assert!(handle.subscribe().is_ok());
    }

    #[tokio::test]
    async fn test_events_survive_resubscription() {
        let (handle, endpoint) = channel(8);

        let sub = handle.subscribe().unwrap();
        drop(sub);

        endpoint
            .notif_tx
            .send(TransportNotification::Event(ServerEvent::Typing("c1".into())))
            .await
            .unwrap();

        let mut sub = handle.subscribe().unwrap();
        assert_eq!(
            sub.recv().await,
            Some(TransportNotification::Event(ServerEvent::Typing("c1".into())))
        );
    }

    #[tokio::test]
    async fn test_emit_reaches_endpoint() {
        let (handle, mut endpoint) = channel(8);

        handle.join_room(&ChatId::from("c1")).unwrap();
        handle.emit_typing(&ChatId::from("c1")).unwrap();

        assert!(matches!(
            endpoint.cmd_rx.recv().await,
            Some(TransportCommand::Emit(ClientEvent::JoinChat(id))) if id.as_str() == "c1"
        ));
        assert!(matches!(
            endpoint.cmd_rx.recv().await,
            Some(TransportCommand::Emit(ClientEvent::Typing(_)))
        ));
    }

    #[tokio::test]
    async fn test_state_changes_are_published_once() {
        let (handle, endpoint) = channel(8);
        let mut sub = handle.subscribe().unwrap();

        endpoint.set_state(ConnectionState::Connecting).await;
        endpoint.set_state(ConnectionState::Connecting).await;
        endpoint.set_state(ConnectionState::Connected).await;

        assert_eq!(
            sub.recv().await,
            Some(TransportNotification::StateChanged(ConnectionState::Connecting))
        );
        assert_eq!(
            sub.recv().await,
            Some(TransportNotification::StateChanged(ConnectionState::Connected))
        );
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_emit_after_task_exit_fails() {
        let (handle, endpoint) = channel(8);
        drop(endpoint);

        assert!(matches!(
            handle.emit_typing(&ChatId::from("c1")),
            Err(NetError::ChannelClosed)
        ));
    }
}
