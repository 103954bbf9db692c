//! Key/value blobs that survive restarts, overwritten wholesale on update.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::{encode_ts, Database};
use crate::error::Result;

impl Database {
    pub fn get_local_state(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM local_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_local_state(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO local_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, encode_ts(&Utc::now())],
        )?;
        Ok(())
    }

    /// Returns `true` if a value was removed.
    pub fn remove_local_state(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM local_state WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Typed read of a JSON blob.
    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_local_state(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Typed write of a JSON blob.
    pub fn store_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_local_state(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_and_remove() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.get_local_state("selectedChat").unwrap().is_none());

        db.set_local_state("selectedChat", "a").unwrap();
        db.set_local_state("selectedChat", "b").unwrap();
        assert_eq!(db.get_local_state("selectedChat").unwrap().as_deref(), Some("b"));

        assert!(db.remove_local_state("selectedChat").unwrap());
        assert!(!db.remove_local_state("selectedChat").unwrap());
    }

    #[test]
    fn test_json_blob() {
        let db = Database::open_in_memory().unwrap();

        db.store_json("notificationChat", &vec!["m1", "m2"]).unwrap();
        let loaded: Option<Vec<String>> = db.load_json("notificationChat").unwrap();
        assert_eq!(loaded, Some(vec!["m1".to_string(), "m2".to_string()]));
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.set_local_state("notificationChat", "{not json").unwrap();

        let loaded: Result<Option<Vec<String>>> = db.load_json("notificationChat");
        assert!(loaded.is_err());
    }
}
