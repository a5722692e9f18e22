use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::ids::{MessageId, RoomId, UserId};
use crate::model::{Message, Room, User};

/// Durable storage for users, the room and its messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_user_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Exact, case-sensitive name match.
    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;

    async fn find_all_users(&self) -> Result<Vec<User>, StoreError>;

    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<Room>, StoreError>;

    /// All messages in the room, oldest first.
    async fn find_messages_by_room(&self, room_id: &RoomId) -> Result<Vec<Message>, StoreError>;

    /// Insert or replace by id.
    ///
    /// The outcome is final: an error means nothing was written and `Ok`
    /// means the write is durable. Implementations bound their own wait,
    /// so callers await this without an outer deadline.
    async fn save_message(&self, message: &Message) -> Result<(), StoreError>;

    async fn find_message_by_id(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;
}

pub type SharedStore = Arc<dyn ChatStore>;
