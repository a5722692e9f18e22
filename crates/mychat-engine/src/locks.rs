use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use mychat_core::MessageId;

/// One async mutex per message id, created on demand and dropped once no
/// task holds or waits on it.
#[derive(Default)]
pub struct MessageLocks {
    locks: DashMap<MessageId, Arc<Mutex<()>>>,
}

pub struct MessageGuard<'a> {
    owner: &'a MessageLocks,
    id: MessageId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl MessageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: &MessageId) -> MessageGuard<'_> {
        let mutex = self.locks.entry(id.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        MessageGuard {
            owner: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for MessageGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.owner
            .locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
