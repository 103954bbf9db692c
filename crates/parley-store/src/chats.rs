//! CRUD operations for [`Chat`] records.
//!
//! `users_hash` carries a UNIQUE constraint, so creation is an insert-or-get:
//! two racing creators for the same pair converge on a single row.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use parley_shared::{Chat, ChatId, MessageId, NewChat, UserId, UsersHash};

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

const CHAT_COLUMNS: &str =
    "c.id, c.chat_name, c.users_hash, c.is_group_chat, c.latest_message_id, c.created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert the chat unless one with the same `users_hash` exists, then
    /// return whichever row owns the hash.
    ///
    /// Every participant must already exist in `users`; otherwise nothing is
    /// written and [`StoreError::UnknownReference`] is returned.
    pub fn insert_chat_if_absent(
        &self,
        new_chat: &NewChat,
        id: &ChatId,
        created_at: DateTime<Utc>,
    ) -> Result<Chat> {
        let tx = self.conn().unchecked_transaction()?;

        for user_id in &new_chat.participant_ids {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                params![user_id.as_str()],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::UnknownReference {
                    kind: "user",
                    id: user_id.to_string(),
                });
            }
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO chats (id, chat_name, users_hash, is_group_chat, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                new_chat.chat_name,
                new_chat.users_hash.as_str(),
                new_chat.is_group_chat,
                encode_ts(&created_at),
            ],
        )?;

        if inserted == 1 {
            for (position, user_id) in new_chat.participant_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO chat_participants (chat_id, user_id, position)
                     VALUES (?1, ?2, ?3)",
                    params![id.as_str(), user_id.as_str(), position as i64],
                )?;
            }
            tracing::debug!(chat = %id, hash = %new_chat.users_hash, "created chat");
        } else {
            tracing::debug!(hash = %new_chat.users_hash, "chat already exists for participant set");
        }

        tx.commit()?;

        self.find_chat_by_users_hash(&new_chat.users_hash)?
            .ok_or(StoreError::NotFound)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn find_chat_by_users_hash(&self, hash: &UsersHash) -> Result<Option<Chat>> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.users_hash = ?1");
        let chat = self
            .conn()
            .query_row(&sql, params![hash.as_str()], row_to_chat)
            .optional()?;

        chat.map(|c| self.with_participants(c)).transpose()
    }

    pub fn get_chat(&self, id: &ChatId) -> Result<Option<Chat>> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1");
        let chat = self
            .conn()
            .query_row(&sql, params![id.as_str()], row_to_chat)
            .optional()?;

        chat.map(|c| self.with_participants(c)).transpose()
    }

    /// Chats the user participates in, most recently active first.
    pub fn list_chats_for_user(&self, user_id: &UserId) -> Result<Vec<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS}
             FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             LEFT JOIN messages m ON m.id = c.latest_message_id
             WHERE p.user_id = ?1
             ORDER BY COALESCE(m.created_at, c.created_at) DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.as_str()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(self.with_participants(row?)?);
        }
        Ok(chats)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn with_participants(&self, mut chat: Chat) -> Result<Chat> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![chat.id.as_str()], |row| row.get::<_, String>(0))?;

        chat.participant_ids = rows
            .map(|r| r.map(UserId))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chat)
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let created_str: String = row.get(5)?;

    Ok(Chat {
        id: ChatId(row.get(0)?),
        chat_name: row.get(1)?,
        participant_ids: Vec::new(),
        users_hash: UsersHash(row.get(2)?),
        is_group_chat: row.get(3)?,
        latest_message_id: row.get::<_, Option<String>>(4)?.map(MessageId),
        created_at: decode_ts(5, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::User;

    fn seed_users(db: &Database, ids: &[&str]) {
        for id in ids {
            db.upsert_user(&User {
                id: UserId::from(*id),
                name: id.to_uppercase(),
                username: id.to_string(),
                image_url: None,
            })
            .unwrap();
        }
    }

    fn new_chat(a: &str, b: &str) -> NewChat {
        let ids = vec![UserId::from(a), UserId::from(b)];
        NewChat {
            users_hash: UsersHash::from_participants(&ids),
            participant_ids: ids,
            chat_name: "Sender".into(),
            is_group_chat: false,
        }
    }

    #[test]
    fn test_insert_then_find() {
        let db = Database::open_in_memory().unwrap();
        seed_users(&db, &["u1", "u2"]);

        let chat = db
            .insert_chat_if_absent(&new_chat("u1", "u2"), &ChatId::from("c1"), Utc::now())
            .unwrap();

        assert_eq!(chat.id.as_str(), "c1");
        assert_eq!(chat.users_hash.as_str(), "u1,u2");
        assert_eq!(chat.participant_ids, vec![UserId::from("u1"), UserId::from("u2")]);
        assert!(!chat.is_group_chat);

        let found = db.find_chat_by_users_hash(&chat.users_hash).unwrap();
        assert_eq!(found, Some(chat));
    }

    #[test]
    fn test_second_insert_returns_existing_chat() {
        let db = Database::open_in_memory().unwrap();
        seed_users(&db, &["u1", "u2"]);

        let first = db
            .insert_chat_if_absent(&new_chat("u1", "u2"), &ChatId::from("c1"), Utc::now())
            .unwrap();
        let second = db
            .insert_chat_if_absent(&new_chat("u2", "u1"), &ChatId::from("c2"), Utc::now())
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(db.get_chat(&ChatId::from("c2")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_participant_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        seed_users(&db, &["u1"]);

        let err = db
            .insert_chat_if_absent(&new_chat("u1", "ghost"), &ChatId::from("c1"), Utc::now())
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownReference { kind: "user", .. }));
        assert!(db.get_chat(&ChatId::from("c1")).unwrap().is_none());
    }

    #[test]
    fn test_list_chats_for_user() {
        let db = Database::open_in_memory().unwrap();
        seed_users(&db, &["u1", "u2", "u3"]);

        db.insert_chat_if_absent(&new_chat("u1", "u2"), &ChatId::from("c1"), Utc::now())
            .unwrap();
        db.insert_chat_if_absent(&new_chat("u2", "u3"), &ChatId::from("c2"), Utc::now())
            .unwrap();

        let for_u1 = db.list_chats_for_user(&UserId::from("u1")).unwrap();
        assert_eq!(for_u1.len(), 1);
        assert_eq!(for_u1[0].id.as_str(), "c1");

        let for_u2 = db.list_chats_for_user(&UserId::from("u2")).unwrap();
        assert_eq!(for_u2.len(), 2);
    }
}
