use thiserror::Error;

use parley_net::NetError;
use parley_shared::ChatId;
use parley_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Net(#[from] NetError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Chat creation failed: {0}")]
    ChatCreationFailed(String),

    #[error("Message creation failed: {0}")]
    MessageCreationFailed(String),

    #[error("No chat selected")]
    NoChatSelected,

    #[error("Unknown chat: {0}")]
    UnknownChat(ChatId),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("No such pending message")]
    UnknownPending,
}

pub type Result<T> = std::result::Result<T, ClientError>;
