//! Types, wire protocol, and constants shared by every Parley crate.

pub mod constants;
pub mod display;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::*;
