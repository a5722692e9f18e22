//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files are accepted and missing fields keep their defaults.

mod auth;
mod logging;
mod server;
mod storage;

pub use auth::*;
pub use logging::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the chat server.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "auth": { "jwtSecret": "change-me" },
///   "room": { "id": "root" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub room: RoomSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

impl ChatSettings {
    /// Check the values a server needs before it can start.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.storage.validate()?;
        if self.room.id.trim().is_empty() {
            return Err(SettingsError::invalid("room.id", "must not be empty"));
        }
        if self.auth.jwt_secret().is_none() {
            return Err(SettingsError::invalid(
                "auth.jwtSecret",
                "must be set (or MYCHAT_JWT_SECRET)",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn with_secret() -> ChatSettings {
        let mut settings = ChatSettings::default();
        settings.auth.jwt_secret = Some(SecretString::from("s3cret"));
        settings
    }

    #[test]
    fn defaults() {
        let settings = ChatSettings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(settings.storage.store_timeout_ms, 5_000);
        assert_eq!(settings.room.id, "root");
        assert_eq!(settings.logging.level, "info");
        assert!(settings.auth.jwt_secret.is_none());
    }

    #[test]
    fn defaults_need_a_secret() {
        let err = ChatSettings::default().validate().unwrap_err();
        assert!(err.to_string().contains("auth.jwtSecret"));
        assert!(with_secret().validate().is_ok());
    }

    #[test]
    fn blank_room_rejected() {
        let mut settings = with_secret();
        settings.room.id = " ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(ChatSettings::default()).unwrap();
        assert!(json["server"].get("maxSendQueue").is_some());
        assert!(json["storage"].get("storeTimeoutMs").is_some());
        assert!(json["logging"].get("persistWarnings").is_some());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ChatSettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.room.name, "root");
    }
}
