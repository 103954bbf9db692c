// Realtime transport: one websocket per session, driven by a background task.

pub mod backoff;
pub mod connection;
pub mod error;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use connection::{spawn_transport, TransportConfig};
pub use error::NetError;
pub use transport::{
    channel, EventSubscription, TransportCommand, TransportEndpoint, TransportHandle,
    TransportNotification,
};
