use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use parley_shared::{ChatId, Message, MessageId, NewMessage, User, UserId};

use crate::database::{decode_ts, encode_ts, Database};
use crate::error::{Result, StoreError};

const MESSAGE_SELECT: &str = "SELECT m.id, m.chat_id, m.content, m.created_at, m.is_deleted,
            u.id, u.name, u.username, u.image_url
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

impl Database {
    /// Persist a message and point its chat's `latest_message_id` at it.
    pub fn insert_message(
        &self,
        id: &MessageId,
        new_message: &NewMessage,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        let tx = self.conn().unchecked_transaction()?;

        let chat_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM chats WHERE id = ?1)",
            params![new_message.chat.as_str()],
            |row| row.get(0),
        )?;
        if !chat_exists {
            return Err(StoreError::UnknownReference {
                kind: "chat",
                id: new_message.chat.to_string(),
            });
        }

        let sender_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
            params![new_message.sender.as_str()],
            |row| row.get(0),
        )?;
        if !sender_exists {
            return Err(StoreError::UnknownReference {
                kind: "user",
                id: new_message.sender.to_string(),
            });
        }

        tx.execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                new_message.chat.as_str(),
                new_message.sender.as_str(),
                new_message.content,
                encode_ts(&created_at),
            ],
        )?;
        tx.execute(
            "UPDATE chats SET latest_message_id = ?2 WHERE id = ?1",
            params![new_message.chat.as_str(), id.as_str()],
        )?;
        tx.commit()?;

        self.get_message(id)?.ok_or(StoreError::NotFound)
    }

    /// All messages of a chat in creation order.
    pub fn get_messages_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        let sql = format!(
            "{MESSAGE_SELECT} WHERE m.chat_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![chat_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
        let message = self
            .conn()
            .query_row(&sql, params![id.as_str()], row_to_message)
            .optional()?;
        Ok(message)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let ts_str: String = row.get(3)?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        chat_id: ChatId(row.get(1)?),
        content: row.get(2)?,
        created_at: decode_ts(3, &ts_str)?,
        is_deleted: row.get(4)?,
        sender: User {
            id: UserId(row.get(5)?),
            name: row.get(6)?,
            username: row.get(7)?,
            image_url: row.get(8)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_shared::{NewChat, UsersHash};

    fn setup() -> (Database, ChatId) {
        let db = Database::open_in_memory().unwrap();
        for id in ["u1", "u2"] {
            db.upsert_user(&User {
                id: UserId::from(id),
                name: id.to_uppercase(),
                username: id.to_string(),
                image_url: None,
            })
            .unwrap();
        }
        let ids = vec![UserId::from("u1"), UserId::from("u2")];
        let chat = db
            .insert_chat_if_absent(
                &NewChat {
                    users_hash: UsersHash::from_participants(&ids),
                    participant_ids: ids,
                    chat_name: "Sender".into(),
                    is_group_chat: false,
                },
                &ChatId::from("c1"),
                Utc::now(),
            )
            .unwrap();
        (db, chat.id)
    }

    fn new_message(chat: &ChatId, sender: &str, content: &str) -> NewMessage {
        NewMessage {
            content: content.into(),
            sender: UserId::from(sender),
            chat: chat.clone(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_insert_updates_latest_message() {
        let (db, chat_id) = setup();

        let msg = db
            .insert_message(&MessageId::from("m1"), &new_message(&chat_id, "u1", "hello"), Utc::now())
            .unwrap();

        assert_eq!(msg.sender.name, "U1");
        let chat = db.get_chat(&chat_id).unwrap().unwrap();
        assert_eq!(chat.latest_message_id, Some(MessageId::from("m1")));
    }

    #[test]
    fn test_messages_come_back_in_creation_order() {
        let (db, chat_id) = setup();
        let t0 = Utc::now();

        db.insert_message(&MessageId::from("late"), &new_message(&chat_id, "u2", "hi"), t0 + Duration::seconds(1))
            .unwrap();
        db.insert_message(&MessageId::from("early"), &new_message(&chat_id, "u1", "hello"), t0)
            .unwrap();

        let contents: Vec<_> = db
            .get_messages_for_chat(&chat_id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["hello", "hi"]);
    }

    #[test]
    fn test_unknown_chat_is_rejected() {
        let (db, _) = setup();

        let err = db
            .insert_message(&MessageId::from("m1"), &new_message(&ChatId::from("nope"), "u1", "x"), Utc::now())
            .unwrap_err();

        assert!(matches!(err, StoreError::UnknownReference { kind: "chat", .. }));
        assert!(db.get_message(&MessageId::from("m1")).unwrap().is_none());
    }
}
