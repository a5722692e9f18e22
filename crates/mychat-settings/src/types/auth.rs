//! Token settings.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 signing secret shared with whoever issues tokens. Never written
    /// back out.
    #[serde(skip_serializing)]
    pub jwt_secret: Option<SecretString>,
    /// Lifetime of tokens minted by the `token` command.
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 86_400,
        }
    }
}

impl AuthSettings {
    /// The secret, if set and non-blank.
    pub fn jwt_secret(&self) -> Option<&SecretString> {
        self.jwt_secret
            .as_ref()
            .filter(|s| !s.expose_secret().trim().is_empty())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}
