//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup. The returned handle renders the `/metrics` body.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket sessions accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Sessions dropped because their queue was full or closed (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Upgrades refused for a bad or unknown token (counter).
pub const WS_AUTH_REJECTIONS_TOTAL: &str = "ws_auth_rejections_total";
/// Messages created (counter).
pub const MESSAGES_CREATED_TOTAL: &str = "messages_created_total";
/// Messages whose read state changed (counter).
pub const READ_UPDATES_TOTAL: &str = "read_updates_total";
/// Inbound frames that were not a valid request (counter).
pub const DECODE_ERRORS_TOTAL: &str = "decode_errors_total";
/// Requests that failed after decoding (counter, labels: kind).
pub const REQUEST_ERRORS_TOTAL: &str = "request_errors_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(MESSAGES_CREATED_TOTAL).increment(2);
        });
        assert!(handle.render().contains("messages_created_total 2"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_BROADCAST_DROPS_TOTAL,
            WS_AUTH_REJECTIONS_TOTAL,
            MESSAGES_CREATED_TOTAL,
            READ_UPDATES_TOTAL,
            DECODE_ERRORS_TOTAL,
            REQUEST_ERRORS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
