use std::time::Duration;

use tracing::{debug, instrument, warn};

use mychat_core::{ChatError, Message, MessageId, RoomId, SharedStore, User};

use crate::bounded::bounded;
use crate::locks::MessageLocks;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOutcome {
    pub message: Message,
    /// False when the reader was already marked read, or is not a recipient.
    pub changed: bool,
}

/// Flips read flags. Each read-modify-write holds the message's lock.
pub struct ReadStateUpdater {
    store: SharedStore,
    locks: MessageLocks,
    store_timeout: Duration,
}

impl ReadStateUpdater {
    pub fn new(store: SharedStore, store_timeout: Duration) -> Self {
        Self {
            store,
            locks: MessageLocks::new(),
            store_timeout,
        }
    }

    #[instrument(skip_all, fields(user_id = %reader.id, message_id = %target))]
    pub async fn mark_read(
        &self,
        reader: &User,
        target: &MessageId,
    ) -> Result<ReadOutcome, ChatError> {
        let _guard = self.locks.lock(target).await;

        let mut message = bounded(self.store_timeout, self.store.find_message_by_id(target))
            .await?
            .ok_or_else(|| ChatError::not_found("message", target.as_str()))?;

        let changed = message.mark_read_by(&reader.id);
        if changed {
            self.store.save_message(&message).await?;
            debug!(unread = message.unread_count(), "marked read");
        }
        Ok(ReadOutcome { message, changed })
    }

    /// Mark every message in the room that `reader` has not read yet.
    ///
    /// Returns the updated messages oldest first. A failure after some
    /// messages were already flipped is logged and the flipped ones are
    /// still returned, so callers can publish what was persisted.
    #[instrument(skip_all, fields(user_id = %reader.id, room_id = %room_id))]
    pub async fn mark_all_pending_read(
        &self,
        reader: &User,
        room_id: &RoomId,
    ) -> Result<Vec<Message>, ChatError> {
        let pending: Vec<MessageId> =
            bounded(self.store_timeout, self.store.find_messages_by_room(room_id))
                .await?
                .into_iter()
                .filter(|m| m.is_read_by(&reader.id) == Some(false))
                .map(|m| m.id)
                .collect();

        let mut updated = Vec::with_capacity(pending.len());
        for id in pending {
            match self.mark_read(reader, &id).await {
                Ok(outcome) if outcome.changed => updated.push(outcome.message),
                Ok(_) | Err(ChatError::NotFound { .. }) => {}
                Err(e) if updated.is_empty() => return Err(e),
                Err(e) => {
                    warn!(error = %e, flipped = updated.len(), "bulk read stopped early");
                    break;
                }
            }
        }
        Ok(updated)
    }
}
