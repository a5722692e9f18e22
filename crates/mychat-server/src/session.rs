//! One WebSocket session: decode, dispatch, encode, broadcast.
//!
//! Each session runs a writer task that owns the socket sink (snapshot,
//! live frames, heartbeats and write timeouts) while the session task itself
//! reads and dispatches requests. Either side cancelling the session token
//! ends both.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use mychat_core::protocol::{ErrorNotice, ReadTarget, Request};
use mychat_core::{ChatError, ClientId, User};

use crate::auth::check_request_token;
use crate::hub::{Frame, SessionHandle};
use crate::metrics::{
    DECODE_ERRORS_TOTAL, MESSAGES_CREATED_TOTAL, READ_UPDATES_TOTAL, REQUEST_ERRORS_TOTAL,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::server::AppState;

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub max_send_queue: usize,
    pub send_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_send_queue: 256,
            send_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
        }
    }
}

/// Time since the client was last heard from.
struct Liveness {
    started: Instant,
    last_seen_ms: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let now = self.started.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_seen_ms.load(Ordering::Relaxed)))
    }
}

/// Serve an authenticated socket until either side goes away.
pub async fn run_session(socket: WebSocket, user: User, state: AppState) {
    let client_id = ClientId::new();
    let span = info_span!("session", client_id = %client_id, user_id = %user.id);
    serve(socket, client_id, user, state).instrument(span).await;
}

async fn serve(mut socket: WebSocket, client_id: ClientId, user: User, state: AppState) {
    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(user = %user.name, "session connected");

    let config = state.session;
    let cancel = state.shutdown.child_token();
    let (tx, rx) = mpsc::channel::<Frame>(config.max_send_queue);

    let handle = SessionHandle::new(client_id.clone(), user.id.clone(), tx.clone(), cancel.clone());
    let snapshot = match state.hub.register(handle, state.engine.snapshot()).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(error = %e, "session registration failed");
            let _ = tokio::time::timeout(config.send_timeout, socket.send(WsMessage::Close(None)))
                .await;
            metrics::counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let liveness = Arc::new(Liveness::new());
    let writer = tokio::spawn(
        write_loop(sink, snapshot, rx, liveness.clone(), config, cancel.clone())
            .in_current_span(),
    );

    let session = Session {
        user,
        tx,
        cancel: cancel.clone(),
        state: &state,
    };
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                liveness.touch();
                session.handle_text(text.as_str()).await;
            }
            Some(Ok(WsMessage::Pong(_))) => liveness.touch(),
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
        }
    }

    state.hub.deregister(&client_id);
    cancel.cancel();
    let _ = writer.await;
    metrics::counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!("session closed");
}

/// Writes the snapshot, then live frames from `rx`. Frames broadcast while
/// the snapshot is still being written wait in `rx`.
async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    snapshot: Vec<Frame>,
    mut rx: mpsc::Receiver<Frame>,
    liveness: Arc<Liveness>,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    let mut snapshot = VecDeque::from(snapshot);
    let reason = loop {
        if cancel.is_cancelled() {
            break "cancelled";
        }
        let outgoing = if let Some(frame) = snapshot.pop_front() {
            WsMessage::Text(frame.to_string().into())
        } else {
            tokio::select! {
                _ = cancel.cancelled() => break "cancelled",
                frame = rx.recv() => match frame {
                    Some(frame) => WsMessage::Text(frame.to_string().into()),
                    None => break "queue closed",
                },
                _ = heartbeat.tick() => {
                    if liveness.idle() > config.client_timeout {
                        warn!(idle_secs = liveness.idle().as_secs(), "client stopped answering pings");
                        break "heartbeat timeout";
                    }
                    WsMessage::Ping(Vec::new().into())
                }
            }
        };
        match tokio::time::timeout(config.send_timeout, sink.send(outgoing)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "socket write failed");
                break "write failed";
            }
            Err(_) => {
                warn!(timeout_ms = config.send_timeout.as_millis() as u64, "socket write timed out");
                break "write timeout";
            }
        }
    };

    debug!(reason, "writer stopped");
    cancel.cancel();
    let _ = tokio::time::timeout(config.send_timeout, sink.send(WsMessage::Close(None))).await;
}

struct Session<'a> {
    user: User,
    tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    state: &'a AppState,
}

impl Session<'_> {
    async fn handle_text(&self, text: &str) {
        let request = match Request::decode(text) {
            Ok(request) => request,
            Err(e) => {
                metrics::counter!(DECODE_ERRORS_TOTAL).increment(1);
                debug!(error = %e, "undecodable request");
                self.notify(&e).await;
                return;
            }
        };

        if let Some(token) = request.from_token() {
            if let Err(e) = check_request_token(&self.state.verifier, &self.user, token) {
                warn!(error = %e, "request token rejected");
                self.notify(&e).await;
                return;
            }
        }

        let result = match request {
            Request::Create { value, .. } => self.create(&value).await,
            Request::Read { target, .. } => self.read(ReadTarget::parse(target.as_deref())).await,
            Request::Unknown => {
                debug!("ignoring unknown op");
                return;
            }
        };
        if let Err(e) = result {
            metrics::counter!(REQUEST_ERRORS_TOTAL, "kind" => e.error_kind()).increment(1);
            warn!(error = %e, kind = e.error_kind(), retryable = e.is_retryable(), "request failed");
            self.notify(&e).await;
        }
    }

    async fn create(&self, text: &str) -> Result<(), ChatError> {
        let engine = &self.state.engine;
        let user = &self.user;
        let created = self
            .state
            .hub
            .commit(async { engine.create(user, text).await.map(|m| vec![m]) })
            .await?;
        metrics::counter!(MESSAGES_CREATED_TOTAL).increment(created.len() as u64);
        Ok(())
    }

    async fn read(&self, target: ReadTarget) -> Result<(), ChatError> {
        let changed = self
            .state
            .hub
            .commit(self.state.engine.mark_read(&self.user, &target))
            .await?;
        if changed.is_empty() {
            debug!(read_target = ?target, "read changed nothing");
        }
        metrics::counter!(READ_UPDATES_TOTAL).increment(changed.len() as u64);
        Ok(())
    }

    /// Error notices go to this session only.
    async fn notify(&self, err: &ChatError) {
        let frame = Frame::from(ErrorNotice::render(err));
        let sent = tokio::time::timeout(self.state.session.send_timeout, self.tx.send(frame)).await;
        if !matches!(sent, Ok(Ok(()))) {
            debug!("could not deliver error notice, closing");
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn liveness_tracks_idle_time() {
        let liveness = Liveness::new();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(liveness.idle(), Duration::from_secs(5));
        liveness.touch();
        assert_eq!(liveness.idle(), Duration::ZERO);
    }

    #[test]
    fn default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.max_send_queue, 256);
        assert!(config.client_timeout > config.heartbeat_interval);
    }
}
