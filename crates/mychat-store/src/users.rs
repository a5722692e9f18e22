use chrono::Utc;
use tracing::instrument;

use mychat_core::{User, UserId};

use crate::database::Database;
use crate::error::DbError;
use crate::row_helpers::optional;

#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user. Names are unique; a duplicate is a `Conflict`.
    #[instrument(skip(self))]
    pub fn create(&self, name: &str) -> Result<User, DbError> {
        let name = name.trim();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DbError::Conflict(format!(
                "user name must be non-empty without whitespace: {name:?}"
            )));
        }
        let user = User::new(name);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user.id.as_str(), user.name, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<Option<User>, DbError> {
        self.db.with_conn(|conn| {
            optional(conn.query_row(
                "SELECT id, name FROM users WHERE id = ?1",
                [id.as_str()],
                map_user,
            ))
        })
    }

    #[instrument(skip(self))]
    pub fn find_by_name(&self, name: &str) -> Result<Option<User>, DbError> {
        self.db.with_conn(|conn| {
            optional(conn.query_row(
                "SELECT id, name FROM users WHERE name = ?1",
                [name],
                map_user,
            ))
        })
    }

    /// All users in creation order.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<User>, DbError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM users ORDER BY rowid")?;
            let users = stmt
                .query_map([], map_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from_raw(row.get::<_, String>(0)?),
        name: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> UserRepo {
        UserRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_and_get() {
        let repo = repo();
        let alice = repo.create("alice").unwrap();
        assert!(alice.id.as_str().starts_with("user_"));
        assert_eq!(repo.get(&alice.id).unwrap(), Some(alice));
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let repo = repo();
        repo.create("alice").unwrap();
        assert!(matches!(repo.create("alice"), Err(DbError::Conflict(_))));
    }

    #[test]
    fn names_with_whitespace_are_rejected() {
        let repo = repo();
        assert!(matches!(repo.create("al ice"), Err(DbError::Conflict(_))));
        assert!(matches!(repo.create("   "), Err(DbError::Conflict(_))));
    }

    #[test]
    fn find_by_name_is_exact() {
        let repo = repo();
        let alice = repo.create("alice").unwrap();
        assert_eq!(repo.find_by_name("alice").unwrap(), Some(alice));
        assert_eq!(repo.find_by_name("Alice").unwrap(), None);
        assert_eq!(repo.find_by_name("ali").unwrap(), None);
    }

    #[test]
    fn list_in_creation_order() {
        let repo = repo();
        for name in ["carol", "alice", "bob"] {
            repo.create(name).unwrap();
        }
        let names: Vec<String> = repo.list().unwrap().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn missing_user_is_none() {
        assert_eq!(repo().get(&UserId::from_raw("user_nope")).unwrap(), None);
    }
}
