//! The session event loop.
//!
//! One task owns the [`ChatSession`] and multiplexes UI commands, transport
//! notifications, backend results and the typing timer.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use parley_net::EventSubscription;

use crate::error::{ClientError, Result};
use crate::session::{ChatSession, SessionCommand, TaskOutcome};

/// UI side of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Net(parley_net::NetError::ChannelClosed))
    }

    pub fn sender(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    /// Ask the loop to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session task did not finish cleanly");
        }
    }
}

/// Subscribe to the session's transport and run the loop on its own task.
///
/// Fails if something else is already listening to the transport.
pub fn spawn_session(
    session: ChatSession,
    tasks: mpsc::UnboundedReceiver<TaskOutcome>,
) -> Result<SessionHandle> {
    let subscription = session.transport().subscribe()?;
    let (commands_tx, commands_rx) = mpsc::channel(64);
    let task = tokio::spawn(run_session(session, commands_rx, tasks, subscription));
    Ok(SessionHandle {
        commands: commands_tx,
        task,
    })
}

pub async fn run_session(
    mut session: ChatSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut tasks: mpsc::UnboundedReceiver<TaskOutcome>,
    mut transport_events: EventSubscription,
) {
    session.start();
    let mut transport_open = true;

    loop {
        let deadline = session.typing_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    if !session.handle_command(command) {
                        break;
                    }
                }
                None => break,
            },

            Some(outcome) = tasks.recv() => session.handle_task(outcome),

            notification = transport_events.recv(), if transport_open => match notification {
                Some(notification) => session.handle_transport(notification),
                None => {
                    warn!("Transport task ended, live updates disabled");
                    transport_open = false;
                }
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                session.on_typing_deadline(Instant::now());
            }
        }
    }

    session.shutdown().await;
    info!("Session loop stopped");
}
