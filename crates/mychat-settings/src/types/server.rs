//! WebSocket server settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// Outbound frames buffered per connection before it is dropped as too slow.
    pub max_send_queue: usize,
    /// Upper bound on a single socket write.
    pub send_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
    /// Close a connection that has not answered a ping for this long.
    pub client_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            send_timeout_ms: 5_000,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
        }
    }
}

impl ServerSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_send_queue == 0 {
            return Err(SettingsError::invalid("server.maxSendQueue", "must be at least 1"));
        }
        if self.send_timeout_ms == 0 {
            return Err(SettingsError::invalid("server.sendTimeoutMs", "must be non-zero"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SettingsError::invalid(
                "server.heartbeatIntervalSecs",
                "must be non-zero",
            ));
        }
        if self.client_timeout_secs <= self.heartbeat_interval_secs {
            return Err(SettingsError::invalid(
                "server.clientTimeoutSecs",
                "must exceed the heartbeat interval",
            ));
        }
        Ok(())
    }
}
