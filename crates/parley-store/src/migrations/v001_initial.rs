//! v001 -- Initial schema creation.
//!
//! Creates `users`, `chats`, `chat_participants`, `messages`, and the
//! `local_state` key/value table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id        TEXT PRIMARY KEY NOT NULL,
    name      TEXT NOT NULL,
    username  TEXT NOT NULL,
    image_url TEXT
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id                TEXT PRIMARY KEY NOT NULL,
    chat_name         TEXT NOT NULL,
    users_hash        TEXT NOT NULL UNIQUE,       -- one chat per participant set
    is_group_chat     INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    latest_message_id TEXT,
    created_at        TEXT NOT NULL               -- RFC-3339, UTC, micros
);

CREATE TABLE IF NOT EXISTS chat_participants (
    chat_id  TEXT NOT NULL,
    user_id  TEXT NOT NULL,
    position INTEGER NOT NULL,                    -- preserves participant order

    PRIMARY KEY (chat_id, user_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_chat_participants_user
    ON chat_participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,
    chat_id    TEXT NOT NULL,
    sender_id  TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, created_at ASC);

-- ----------------------------------------------------------------
-- Local state (selected chat, notification cache)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS local_state (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
