//! Realtime chat core: directory, history, notifications, typing and chat
//! lookup, driven by a single session loop.

pub mod backend;
pub mod chat_lookup;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod history;
pub mod notifications;
pub mod receiver;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod typing;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::{ChatBackend, LocalBackend, RestBackend};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::{ChatEvent, SoundCue};
pub use runtime::{run_session, spawn_session, SessionHandle};
pub use session::{ChatSession, SessionChannels, SessionCommand, TaskOutcome};
pub use storage::LocalState;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_net=debug,parley_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
