//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the server is serving.
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Registered WebSocket sessions.
    pub connections: usize,
}

pub fn health_check(started_at: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: started_at.elapsed().as_secs(),
        connections,
    }
}
