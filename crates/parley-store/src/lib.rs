//! # parley-store
//!
//! Local SQLite storage for Parley.
//!
//! Holds the user/chat/message tables used by the local backend and the small
//! key/value area standing in for browser local storage (active selection,
//! notification cache).  The crate exposes a synchronous `Database` handle
//! that wraps a `rusqlite::Connection` with typed helpers per table.

pub mod chats;
pub mod database;
pub mod local_state;
pub mod messages;
pub mod migrations;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
