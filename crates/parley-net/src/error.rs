use thiserror::Error;

use parley_shared::ProtocolError;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Transport task is gone")]
    ChannelClosed,

    #[error("Transport command queue is full")]
    ChannelFull,

    #[error("An event subscription is already active for this connection")]
    AlreadySubscribed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server did not acknowledge setup in time")]
    AckTimeout,
}
