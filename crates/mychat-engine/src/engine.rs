use std::time::Duration;

use tracing::{debug, instrument};

use mychat_core::protocol::ReadTarget;
use mychat_core::{ChatError, Message, Room, RoomId, SharedStore, User, UserId};

use crate::assembler::MessageAssembler;
use crate::bounded::bounded;
use crate::read_state::ReadStateUpdater;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The single room every message belongs to.
    pub room_id: RoomId,
    /// Upper bound on each store call.
    pub store_timeout: Duration,
}

/// The create and read pipelines for the room.
///
/// Each step returns a `Result`; a message leaves `create` only once it is
/// fully built and persisted.
pub struct ChatEngine {
    store: SharedStore,
    config: EngineConfig,
    assembler: MessageAssembler,
    read_state: ReadStateUpdater,
}

impl ChatEngine {
    pub fn new(store: SharedStore, config: EngineConfig) -> Self {
        Self {
            assembler: MessageAssembler::new(store.clone(), config.store_timeout),
            read_state: ReadStateUpdater::new(store.clone(), config.store_timeout),
            store,
            config,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.config.room_id
    }

    pub async fn room(&self) -> Result<Room, ChatError> {
        bounded(
            self.config.store_timeout,
            self.store.find_room_by_id(&self.config.room_id),
        )
        .await?
        .ok_or_else(|| ChatError::not_found("room", self.config.room_id.as_str()))
    }

    pub async fn user(&self, id: &UserId) -> Result<User, ChatError> {
        bounded(self.config.store_timeout, self.store.find_user_by_id(id))
            .await?
            .ok_or_else(|| ChatError::not_found("user", id.as_str()))
    }

    /// Every message in the room, oldest first.
    pub async fn snapshot(&self) -> Result<Vec<Message>, ChatError> {
        bounded(
            self.config.store_timeout,
            self.store.find_messages_by_room(&self.config.room_id),
        )
        .await
    }

    /// Create a message from `sender` with the current roster as recipients.
    #[instrument(skip_all, fields(sender = %sender.id))]
    pub async fn create(&self, sender: &User, raw_text: &str) -> Result<Message, ChatError> {
        let room = self.room().await?;
        let roster = bounded(self.config.store_timeout, self.store.find_all_users()).await?;
        self.assembler
            .assemble(sender, raw_text, &room, &roster)
            .await
    }

    /// Apply a read request and return the messages whose state changed.
    ///
    /// Reading a message that does not exist is a no-op.
    #[instrument(skip_all, fields(reader = %reader.id))]
    pub async fn mark_read(
        &self,
        reader: &User,
        target: &ReadTarget,
    ) -> Result<Vec<Message>, ChatError> {
        match target {
            ReadTarget::One(id) => match self.read_state.mark_read(reader, id).await {
                Ok(outcome) if outcome.changed => Ok(vec![outcome.message]),
                Ok(_) => Ok(Vec::new()),
                Err(ChatError::NotFound { kind, id }) => {
                    debug!(kind, id, "read target missing");
                    Ok(Vec::new())
                }
                Err(e) => Err(e),
            },
            ReadTarget::AllPending => self.mark_all_read(reader).await,
        }
    }

    /// Mark every message `reader` has pending, oldest first.
    pub async fn mark_all_read(&self, reader: &User) -> Result<Vec<Message>, ChatError> {
        self.read_state
            .mark_all_pending_read(reader, &self.config.room_id)
            .await
    }
}
