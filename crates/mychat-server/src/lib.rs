//! WebSocket transport for the chat room.

pub mod auth;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;

pub use hub::{BroadcastHub, Frame, HubError, SessionHandle};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use session::SessionConfig;
pub use shutdown::ShutdownCoordinator;
