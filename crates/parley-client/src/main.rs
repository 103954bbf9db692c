//! Headless chat client: one command or message per stdin line.
//!
//! ```text
//! /select <chatId>   open a chat from the directory
//! /open <userId>     open (or create) the chat with a user
//! /retry <localId>   resend a failed message
//! /discard <localId> drop a failed message
//! /type              simulate a keystroke
//! /home              leave the current chat
//! /refresh           reload the directory
//! /quit
//! anything else      send as a message
//! ```

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_client::{
    init_tracing, ChatBackend, ChatEvent, ChatSession, ClientConfig, LocalState, RestBackend,
    SessionCommand,
};
use parley_net::spawn_transport;
use parley_shared::constants::APP_NAME;
use parley_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ClientConfig::from_env();
    let user_id = config
        .user_id
        .clone()
        .context("PARLEY_USER_ID must name the user to run as")?;

    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let state = LocalState::new(Arc::new(Mutex::new(db)));

    let backend: Arc<dyn ChatBackend> = Arc::new(RestBackend::new(&config.api_url)?);
    let user = backend
        .get_user_by_id(&user_id)
        .await?
        .with_context(|| format!("user {user_id} does not exist"))?;

    tracing::info!(user = %user.id, api = %config.api_url, ws = %config.ws_url, "Starting {APP_NAME}");

    let transport = spawn_transport(config.transport(), user.clone());
    let (session, channels) =
        ChatSession::new(user, backend, transport, state, config.typing_timeout);
    let handle = parley_client::spawn_session(session, channels.tasks)?;
    // Starting the binary opens the chat page, which drops any saved selection.
    handle.send(SessionCommand::PageMounted).await?;

    let mut events = channels.events;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interacted = false;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !interacted {
            handle.send(SessionCommand::UserInteracted).await?;
            interacted = true;
        }
        match parse_line(line) {
            Ok(Some(command)) => handle.send(command).await?,
            Ok(None) => break,
            Err(e) => eprintln!("{e}"),
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// `Ok(None)` means quit.
fn parse_line(line: &str) -> anyhow::Result<Option<SessionCommand>> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(SessionCommand::Send(line.to_string())));
    };
    let (verb, arg) = match rest.split_once(' ') {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (rest, ""),
    };

    let command = match (verb, arg) {
        ("quit", _) => return Ok(None),
        ("refresh", _) => SessionCommand::RefreshChats,
        ("home", _) => SessionCommand::PageMounted,
        ("type", _) => SessionCommand::Keystroke,
        ("select", id) if !id.is_empty() => SessionCommand::SelectChat(id.into()),
        ("open", id) if !id.is_empty() => SessionCommand::OpenChatWith(id.into()),
        ("retry", id) => SessionCommand::RetrySend(id.parse().context("bad local id")?),
        ("discard", id) => SessionCommand::DiscardSend(id.parse().context("bad local id")?),
        _ => bail!("unknown command: /{verb}"),
    };
    Ok(Some(command))
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::SelectionChanged(Some(chat_id)) => println!("* now in chat {chat_id}"),
        ChatEvent::SelectionChanged(None) => println!("* no chat selected"),
        ChatEvent::ReceiverResolved { chat_id, name } => println!("* {chat_id}: {name}"),
        ChatEvent::PeerTyping { typing: true, .. } => println!("* typing..."),
        ChatEvent::NotificationsChanged { unread } => println!("* {unread} unread"),
        ChatEvent::Alert(alert) => println!("! {}: {}", alert.sender_name, alert.body),
        ChatEvent::Connection(state) => println!("* connection {state:?}"),
        ChatEvent::Notice(text) => println!("! {text}"),
        ChatEvent::ComposeRestored(text) => println!("* restored draft: {text}"),
        other => tracing::trace!(event = ?other, "UI event"),
    }
}
