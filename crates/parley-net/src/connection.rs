//! Websocket connection task with reconnect.
//!
//! The task cycles `Disconnected -> Connecting -> Connected`.  A connection is
//! only `Connected` after the server acknowledged `setup`; until then every
//! event except `join chat` is dropped.  The last joined room is remembered
//! and re-joined after every reconnect.

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use parley_shared::constants::DEFAULT_WS_URL;
use parley_shared::{ChatId, ClientEvent, ConnectionState, ServerEvent, User};

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::NetError;
use crate::transport::{
    channel, TransportCommand, TransportEndpoint, TransportHandle, TransportNotification,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for spawning the transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Websocket URL of the realtime server.
    pub url: String,
    /// Reconnect delays.
    pub backoff: BackoffConfig,
    /// How long to wait for the `connected` ack after `setup`.
    pub ack_timeout: Duration,
    /// Capacity of the command and notification queues.
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            backoff: BackoffConfig::default(),
            ack_timeout: Duration::from_secs(10),
            channel_capacity: 256,
        }
    }
}

/// Why a live connection ended.
enum Exit {
    Shutdown,
    Dropped(Option<NetError>),
}

/// Spawn the connection task for `user` and return the application handle.
pub fn spawn_transport(config: TransportConfig, user: User) -> TransportHandle {
    let (handle, endpoint) = channel(config.channel_capacity);

    tokio::spawn(async move {
        run(config, user, endpoint).await;
    });

    handle
}

async fn run(config: TransportConfig, user: User, mut endpoint: TransportEndpoint) {
    let mut backoff = Backoff::new(config.backoff.clone());
    let mut active_room: Option<ChatId> = None;

    info!(url = %config.url, user = %user.id, "Transport started");

    loop {
        endpoint.set_state(ConnectionState::Connecting).await;

        match connect_async(config.url.as_str()).await {
            Ok((socket, _response)) => {
                debug!(url = %config.url, "Websocket open, announcing presence");
                let exit = drive(
                    socket,
                    &config,
                    &user,
                    &mut endpoint,
                    &mut active_room,
                    &mut backoff,
                )
                .await;

                match exit {
                    Exit::Shutdown => break,
                    Exit::Dropped(Some(e)) => warn!(error = %e, "Connection lost"),
                    Exit::Dropped(None) => info!("Connection closed by server"),
                }
            }
            Err(e) => {
                warn!(url = %config.url, error = %e, "Connection attempt failed");
            }
        }

        endpoint.set_state(ConnectionState::Disconnected).await;

        let delay = backoff.next_delay();
        info!(attempt = backoff.attempts, delay_ms = delay.as_millis() as u64, "Reconnecting");

        if !wait_offline(delay, &mut endpoint, &mut active_room).await {
            break;
        }
    }

    endpoint.set_state(ConnectionState::Disconnected).await;
    info!("Transport task terminated");
}

/// Sleep out the backoff while still draining commands. Returns `false` on
/// shutdown.
async fn wait_offline(
    delay: Duration,
    endpoint: &mut TransportEndpoint,
    active_room: &mut Option<ChatId>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = endpoint.cmd_rx.recv() => match cmd {
                Some(TransportCommand::Emit(event)) => hold_while_offline(event, active_room),
                Some(TransportCommand::Shutdown) | None => return false,
            },
        }
    }
}

fn hold_while_offline(event: ClientEvent, active_room: &mut Option<ChatId>) {
    match event {
        ClientEvent::JoinChat(chat_id) => {
            debug!(chat = %chat_id, "Room recorded, will join once connected");
            *active_room = Some(chat_id);
        }
        other => debug!(event = ?other, "Not connected, dropping event"),
    }
}

async fn drive(
    socket: Socket,
    config: &TransportConfig,
    user: &User,
    endpoint: &mut TransportEndpoint,
    active_room: &mut Option<ChatId>,
    backoff: &mut Backoff,
) -> Exit {
    let (mut write, mut read) = socket.split();

    if let Err(e) = send_event(&mut write, &ClientEvent::Setup(user.clone())).await {
        return Exit::Dropped(Some(e));
    }

    let mut ready = false;
    let ack_deadline = Instant::now() + config.ack_timeout;

    loop {
        tokio::select! {
            cmd = endpoint.cmd_rx.recv() => {
                let event = match cmd {
                    Some(TransportCommand::Emit(event)) => event,
                    Some(TransportCommand::Shutdown) | None => {
                        info!("Transport shutdown requested");
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Exit::Shutdown;
                    }
                };

                if let ClientEvent::JoinChat(chat_id) = &event {
                    *active_room = Some(chat_id.clone());
                }

                if !ready && event.requires_ready() {
                    hold_while_offline(event, active_room);
                    continue;
                }

                if let Err(e) = send_event(&mut write, &event).await {
                    return Exit::Dropped(Some(e));
                }
            }

            frame = read.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => return Exit::Dropped(None),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Exit::Dropped(Some(e.into())),
                };

                let event = match ServerEvent::from_json(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(error = %e, "Ignoring unrecognised frame");
                        continue;
                    }
                };

                match event {
                    ServerEvent::Connected => {
                        if ready {
                            continue;
                        }
                        ready = true;
                        backoff.reset();
                        info!(user = %user.id, "Realtime connection ready");

                        if let Some(chat_id) = active_room.clone() {
                            debug!(chat = %chat_id, "Re-joining active room");
                            if let Err(e) = send_event(&mut write, &ClientEvent::JoinChat(chat_id)).await {
                                return Exit::Dropped(Some(e));
                            }
                        }
                        endpoint.set_state(ConnectionState::Connected).await;
                    }
                    other => {
                        let _ = endpoint
                            .notif_tx
                            .send(TransportNotification::Event(other))
                            .await;
                    }
                }
            }

            _ = tokio::time::sleep_until(ack_deadline), if !ready => {
                return Exit::Dropped(Some(NetError::AckTimeout));
            }
        }
    }
}

async fn send_event<S>(write: &mut S, event: &ClientEvent) -> Result<(), NetError>
where
    S: Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = event.to_json()?;
    write.send(WsMessage::Text(text)).await?;
    Ok(())
}
