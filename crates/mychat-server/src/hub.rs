//! Live session registry and ordered fan-out.
//!
//! Registration (with its snapshot load) and every commit hold the same
//! sequencing mutex, so all sessions observe one total order and a message
//! is either in a new session's snapshot or in a later broadcast, never both.
//! Nothing under the mutex waits on a client: the snapshot is handed back to
//! the session to write ahead of its queue, and broadcasts never block.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mychat_core::protocol::MessagePayload;
use mychat_core::{ChatError, ClientId, Message, UserId};

use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE};

/// One rendered outbound frame, shared by every recipient.
pub type Frame = Arc<str>;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("snapshot load failed: {0}")]
    Snapshot(#[from] ChatError),
    #[error("failed to render message: {0}")]
    Render(#[from] serde_json::Error),
}

/// The hub's side of a connected session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub client_id: ClientId,
    pub user_id: UserId,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        client_id: ClientId,
        user_id: UserId,
        tx: mpsc::Sender<Frame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client_id,
            user_id,
            tx,
            cancel,
        }
    }
}

#[derive(Default)]
pub struct BroadcastHub {
    sessions: DashMap<ClientId, SessionHandle>,
    sequencer: Mutex<()>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot, add the session to the set and return the
    /// rendered snapshot frames.
    ///
    /// The snapshot future is only polled once the sequencer is held, so the
    /// returned frames and the broadcasts that later reach the session's
    /// queue cover every message exactly once. The caller must write the
    /// frames before anything from the queue. On error the session is left
    /// unregistered.
    pub async fn register<S>(
        &self,
        session: SessionHandle,
        snapshot: S,
    ) -> Result<Vec<Frame>, HubError>
    where
        S: Future<Output = Result<Vec<Message>, ChatError>>,
    {
        let _seq = self.sequencer.lock().await;
        let frames = snapshot
            .await?
            .iter()
            .map(|m| MessagePayload::render(m).map(Frame::from))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            client_id = %session.client_id,
            user_id = %session.user_id,
            snapshot = frames.len(),
            "session registered"
        );
        self.sessions.insert(session.client_id.clone(), session);
        metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(self.sessions.len() as f64);
        Ok(frames)
    }

    /// Remove a session and cancel its tasks. Returns false if it was not
    /// registered.
    pub fn deregister(&self, client_id: &ClientId) -> bool {
        match self.sessions.remove(client_id) {
            Some((_, session)) => {
                session.cancel.cancel();
                metrics::gauge!(WS_CONNECTIONS_ACTIVE).set(self.sessions.len() as f64);
                debug!(client_id = %client_id, "session deregistered");
                true
            }
            None => false,
        }
    }

    /// Run a persisting operation and broadcast what it returns, in order.
    pub async fn commit<Op>(&self, op: Op) -> Result<Vec<Message>, ChatError>
    where
        Op: Future<Output = Result<Vec<Message>, ChatError>>,
    {
        let _seq = self.sequencer.lock().await;
        let messages = op.await?;
        self.fan_out(&messages);
        Ok(messages)
    }

    /// Broadcast already-persisted messages to every session.
    pub async fn broadcast(&self, messages: &[Message]) -> usize {
        let _seq = self.sequencer.lock().await;
        self.fan_out(messages)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.sessions.contains_key(client_id)
    }

    /// Enqueue without waiting. Returns the number of sessions reached.
    fn fan_out(&self, messages: &[Message]) -> usize {
        let frames: Vec<Frame> = messages
            .iter()
            .filter_map(|m| match MessagePayload::render(m) {
                Ok(json) => Some(Frame::from(json)),
                Err(e) => {
                    warn!(message_id = %m.id, error = %e, "failed to render message");
                    None
                }
            })
            .collect();
        if frames.is_empty() {
            return 0;
        }

        let mut failed = Vec::new();
        for entry in self.sessions.iter() {
            for frame in &frames {
                if let Err(e) = entry.tx.try_send(frame.clone()) {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "queue full",
                        mpsc::error::TrySendError::Closed(_) => "queue closed",
                    };
                    failed.push((entry.key().clone(), reason));
                    break;
                }
            }
        }

        let reached = self.sessions.len().saturating_sub(failed.len());
        for (client_id, reason) in failed {
            warn!(client_id = %client_id, reason, "dropping session during broadcast");
            metrics::counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            self.deregister(&client_id);
        }
        debug!(frames = frames.len(), reached, "broadcast");
        reached
    }
}
