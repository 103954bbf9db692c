//! CRUD operations for [`User`] records.

use rusqlite::{params, OptionalExtension};

use parley_shared::{User, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert a user or refresh its profile fields.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, username, image_url)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 username = excluded.username,
                 image_url = excluded.image_url",
            params![user.id.as_str(), user.name, user.username, user.image_url],
        )?;
        Ok(())
    }

    /// Fetch a user by id, `None` if unknown.
    pub fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, name, username, image_url FROM users WHERE id = ?1",
                params![id.as_str()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        name: row.get(1)?,
        username: row.get(2)?,
        image_url: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let mut user = User {
            id: UserId::from("u1"),
            name: "Ada".into(),
            username: "ada".into(),
            image_url: None,
        };

        db.upsert_user(&user).unwrap();
        assert_eq!(db.get_user(&user.id).unwrap(), Some(user.clone()));

        user.image_url = Some("https://img/ada.png".into());
        db.upsert_user(&user).unwrap();
        assert_eq!(db.get_user(&user.id).unwrap(), Some(user));
    }

    #[test]
    fn test_unknown_user_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user(&UserId::from("ghost")).unwrap().is_none());
    }
}
