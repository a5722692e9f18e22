use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use mychat_core::{ChatStore, Message, MessageId, Room, RoomId, StoreError, User, UserId};

use crate::database::Database;
use crate::error::DbError;
use crate::messages::MessageRepo;
use crate::rooms::RoomRepo;
use crate::users::UserRepo;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// `ChatStore` over SQLite. Every call runs on the blocking pool so the
/// connection mutex never parks a runtime worker.
///
/// Writes are bounded here rather than by the caller: a save that cannot
/// get the connection within `write_timeout` fails without writing, and a
/// save that got it always finishes before the call returns.
#[derive(Clone)]
pub struct SqliteChatStore {
    users: UserRepo,
    rooms: RoomRepo,
    messages: MessageRepo,
    write_timeout: Duration,
}

impl SqliteChatStore {
    pub fn new(db: Database) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            rooms: RoomRepo::new(db.clone()),
            messages: MessageRepo::new(db),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn users(&self) -> &UserRepo {
        &self.users
    }

    pub fn rooms(&self) -> &RoomRepo {
        &self.rooms
    }

    pub fn messages(&self) -> &MessageRepo {
        &self.messages
    }

    async fn blocking<F, T>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Self) -> Result<T, DbError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        let result = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Unavailable(format!("{op}: blocking task failed: {e}")))?;
        result.map_err(|e| {
            debug!(op, error = %e, "store call failed");
            match e {
                DbError::LockTimeout => StoreError::Timeout(self.write_timeout),
                other => StoreError::from(other),
            }
        })
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let id = id.clone();
        self.blocking("find_user_by_id", move |s| s.users.get(&id)).await
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let name = name.to_owned();
        self.blocking("find_user_by_name", move |s| s.users.find_by_name(&name))
            .await
    }

    async fn find_all_users(&self) -> Result<Vec<User>, StoreError> {
        self.blocking("find_all_users", |s| s.users.list()).await
    }

    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        let id = id.clone();
        self.blocking("find_room_by_id", move |s| s.rooms.get(&id)).await
    }

    async fn find_messages_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError> {
        let room_id = room_id.clone();
        self.blocking("find_messages_by_room", move |s| {
            s.messages.list_by_room(&room_id)
        })
        .await
    }

    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        let message = message.clone();
        let deadline = Instant::now() + self.write_timeout;
        self.blocking("save_message", move |s| s.messages.save(&message, deadline))
            .await
    }

    async fn find_message_by_id(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let id = id.clone();
        self.blocking("find_message_by_id", move |s| s.messages.get(&id))
            .await
    }
}
