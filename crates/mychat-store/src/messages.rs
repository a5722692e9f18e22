use std::collections::BTreeMap;
use std::time::Instant;

use rusqlite::Connection;
use tracing::instrument;

use mychat_core::{ContentSegment, Mention, Message, MessageId, RoomId, User, UserId};

use crate::database::Database;
use crate::error::DbError;
use crate::row_helpers::{optional, parse_json};

const SELECT_MESSAGE: &str = "SELECT m.id, m.room_id, m.sender_id, u.name, m.created_at, \
     m.contents, m.mentions, m.read_users \
     FROM messages m JOIN users u ON u.id = m.sender_id";

/// Raw column values, decoded into a `Message` after the row is read.
struct MessageRow {
    id: String,
    room_id: String,
    sender_id: String,
    sender_name: String,
    created_at: i64,
    contents: String,
    mentions: String,
    read_users: String,
}

struct JsonColumns {
    contents: String,
    mentions: String,
    read_users: String,
}

impl JsonColumns {
    fn encode(message: &Message) -> Result<Self, DbError> {
        Ok(Self {
            contents: serde_json::to_string(&message.contents)?,
            mentions: serde_json::to_string(&message.mentions)?,
            read_users: serde_json::to_string(&message.read_users)?,
        })
    }
}

fn upsert(conn: &Connection, message: &Message, columns: &JsonColumns) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO messages (id, room_id, sender_id, created_at, contents, mentions, read_users)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             contents = excluded.contents,
             mentions = excluded.mentions,
             read_users = excluded.read_users",
        rusqlite::params![
            message.id.as_str(),
            message.room_id.as_str(),
            message.sender.id.as_str(),
            message.created_at,
            columns.contents,
            columns.mentions,
            columns.read_users,
        ],
    )?;
    Ok(())
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            room_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_name: row.get(3)?,
            created_at: row.get(4)?,
            contents: row.get(5)?,
            mentions: row.get(6)?,
            read_users: row.get(7)?,
        })
    }

    fn into_message(self) -> Result<Message, DbError> {
        let contents: Vec<ContentSegment> = parse_json(&self.contents, "messages", "contents")?;
        let mentions: Vec<Mention> = parse_json(&self.mentions, "messages", "mentions")?;
        let read_users: BTreeMap<UserId, bool> =
            parse_json(&self.read_users, "messages", "read_users")?;
        Ok(Message {
            id: MessageId::from_raw(self.id),
            room_id: RoomId::from_raw(self.room_id),
            sender: User {
                id: UserId::from_raw(self.sender_id),
                name: self.sender_name,
            },
            created_at: self.created_at,
            contents,
            mentions,
            read_users,
        })
    }
}

#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or update by id. An update rewrites the JSON columns and keeps
    /// the original insertion sequence.
    ///
    /// Nothing is written unless the connection is free before `deadline`.
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    pub fn save(&self, message: &Message, deadline: Instant) -> Result<(), DbError> {
        let columns = JsonColumns::encode(message)?;
        self.db
            .with_conn_until(deadline, |conn| upsert(conn, message, &columns))
    }

    #[instrument(skip(self), fields(message_id = %id))]
    pub fn get(&self, id: &MessageId) -> Result<Option<Message>, DbError> {
        let row = self.db.with_conn(|conn| {
            optional(conn.query_row(
                &format!("{SELECT_MESSAGE} WHERE m.id = ?1"),
                [id.as_str()],
                MessageRow::from_row,
            ))
        })?;
        row.map(MessageRow::into_message).transpose()
    }

    /// Messages of one room, oldest first.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, DbError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_MESSAGE} WHERE m.room_id = ?1 ORDER BY m.created_at, m.seq"
            ))?;
            let rows = stmt
                .query_map([room_id.as_str()], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::RoomRepo;
    use crate::users::UserRepo;

    struct Fixture {
        messages: MessageRepo,
        room: RoomId,
        alice: User,
        bob: User,
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let room = RoomRepo::new(db.clone())
            .ensure(&RoomId::from_raw("root"), "root")
            .unwrap();
        Fixture {
            messages: MessageRepo::new(db),
            room: room.id,
            alice: users.create("alice").unwrap(),
            bob: users.create("bob").unwrap(),
        }
    }

    fn soon() -> Instant {
        Instant::now() + std::time::Duration::from_secs(1)
    }

    fn message(f: &Fixture, created_at: i64) -> Message {
        Message {
            id: MessageId::new(),
            room_id: f.room.clone(),
            sender: f.bob.clone(),
            created_at,
            contents: vec![
                ContentSegment::text("hi "),
                ContentSegment::mention(f.alice.clone()),
            ],
            mentions: vec![Mention {
                user: f.alice.clone(),
                is_read: false,
            }],
            read_users: BTreeMap::from([(f.bob.id.clone(), true), (f.alice.id.clone(), false)]),
        }
    }

    #[test]
    fn save_and_get_roundtrip() {
        let f = fixture();
        let msg = message(&f, 10);
        f.messages.save(&msg, soon()).unwrap();
        assert_eq!(f.messages.get(&msg.id).unwrap(), Some(msg));
    }

    #[test]
    fn save_twice_updates_in_place() {
        let f = fixture();
        let mut msg = message(&f, 10);
        f.messages.save(&msg, soon()).unwrap();
        assert!(msg.mark_read_by(&f.alice.id));
        f.messages.save(&msg, soon()).unwrap();

        let all = f.messages.list_by_room(&f.room).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].unread_count(), 0);
        assert!(all[0].mentions[0].is_read);
    }

    #[test]
    fn list_orders_by_timestamp_then_insertion() {
        let f = fixture();
        let late = message(&f, 30);
        let tie_a = message(&f, 20);
        let tie_b = message(&f, 20);
        for msg in [&late, &tie_a, &tie_b] {
            f.messages.save(msg, soon()).unwrap();
        }
        let ids: Vec<MessageId> = f
            .messages
            .list_by_room(&f.room)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![tie_a.id, tie_b.id, late.id]);
    }

    #[test]
    fn unknown_sender_violates_foreign_key() {
        let f = fixture();
        let mut msg = message(&f, 1);
        msg.sender = User::new("ghost");
        assert!(matches!(f.messages.save(&msg, soon()), Err(DbError::Conflict(_))));
    }

    #[test]
    fn corrupt_json_is_reported() {
        let f = fixture();
        let msg = message(&f, 1);
        f.messages.save(&msg, soon()).unwrap();
        f.messages
            .db
            .with_conn(|conn| {
                conn.execute("UPDATE messages SET read_users = 'nope'", [])?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(
            f.messages.get(&msg.id),
            Err(DbError::CorruptRow {
                column: "read_users",
                ..
            })
        ));
    }
}
