use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use mychat_auth::TokenVerifier;
use mychat_engine::ChatEngine;
use mychat_settings::ServerSettings;

use crate::auth::{authenticate, extract_token, rejection_status, ConnectParams};
use crate::health::health_check;
use crate::hub::BroadcastHub;
use crate::metrics::WS_AUTH_REJECTIONS_TOTAL;
use crate::session::{run_session, SessionConfig};
use crate::shutdown::ShutdownCoordinator;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            session: SessionConfig::default(),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            session: SessionConfig {
                max_send_queue: settings.max_send_queue,
                send_timeout: settings.send_timeout(),
                heartbeat_interval: settings.heartbeat_interval(),
                client_timeout: settings.client_timeout(),
            },
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub hub: Arc<BroadcastHub>,
    pub verifier: Arc<TokenVerifier>,
    pub session: SessionConfig,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, start serving in the background and return a handle.
pub async fn start(
    config: ServerConfig,
    engine: Arc<ChatEngine>,
    verifier: TokenVerifier,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let coordinator = ShutdownCoordinator::new();
    let hub = Arc::new(BroadcastHub::new());

    let state = AppState {
        engine,
        hub: Arc::clone(&hub),
        verifier: Arc::new(verifier),
        session: config.session,
        shutdown: coordinator.token(),
        started_at: Instant::now(),
        metrics,
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "chat server listening");

    let token = coordinator.token();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        hub,
        coordinator,
        server,
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running.
pub struct ServerHandle {
    pub addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    coordinator: ShutdownCoordinator,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> usize {
        self.hub.len()
    }

    /// Close every session and stop accepting connections.
    pub async fn shutdown(self, timeout: Duration) {
        info!(connections = self.hub.len(), "shutting down");
        self.coordinator
            .graceful_shutdown(vec![self.server], Some(timeout))
            .await;
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = extract_token(&params, &headers);
    match authenticate(&state.verifier, &state.engine, token).await {
        Ok(user) => ws
            .on_upgrade(move |socket| run_session(socket, user, state))
            .into_response(),
        Err(e) => {
            metrics::counter!(WS_AUTH_REJECTIONS_TOTAL).increment(1);
            warn!(error = %e, "upgrade rejected");
            (rejection_status(&e), e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(health_check(state.started_at, state.hub.len()))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
