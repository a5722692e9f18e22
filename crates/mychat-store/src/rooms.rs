use chrono::Utc;
use tracing::{info, instrument};

use mychat_core::{Room, RoomId};

use crate::database::Database;
use crate::error::DbError;
use crate::row_helpers::optional;

#[derive(Clone)]
pub struct RoomRepo {
    db: Database,
}

impl RoomRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the room with this id, creating it when absent.
    /// An existing room keeps its stored name.
    #[instrument(skip(self), fields(room_id = %id))]
    pub fn ensure(&self, id: &RoomId, name: &str) -> Result<Room, DbError> {
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO rooms (id, name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.as_str(), name, Utc::now().to_rfc3339()],
            )?;
            if inserted > 0 {
                info!(room_id = %id, name, "room created");
            }
            conn.query_row(
                "SELECT id, name FROM rooms WHERE id = ?1",
                [id.as_str()],
                map_room,
            )
            .map_err(DbError::from)
        })
    }

    #[instrument(skip(self), fields(room_id = %id))]
    pub fn get(&self, id: &RoomId) -> Result<Option<Room>, DbError> {
        self.db.with_conn(|conn| {
            optional(conn.query_row(
                "SELECT id, name FROM rooms WHERE id = ?1",
                [id.as_str()],
                map_room,
            ))
        })
    }
}

fn map_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: RoomId::from_raw(row.get::<_, String>(0)?),
        name: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_then_returns_existing() {
        let repo = RoomRepo::new(Database::in_memory().unwrap());
        let id = RoomId::from_raw("root");
        let first = repo.ensure(&id, "lobby").unwrap();
        let second = repo.ensure(&id, "renamed").unwrap();
        assert_eq!(first, second);
        assert_eq!(second.name, "lobby");
    }

    #[test]
    fn get_missing_room() {
        let repo = RoomRepo::new(Database::in_memory().unwrap());
        assert_eq!(repo.get(&RoomId::from_raw("nope")).unwrap(), None);
    }
}
