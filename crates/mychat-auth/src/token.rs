//! HS256 JWTs carrying a user id.
//!
//! The user id is the `sub` claim. Tokens minted by older clients carry it
//! in `jti` instead, which is accepted when `sub` is absent.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mychat_core::{ChatError, UserId};

/// Tokens above this size are rejected before any decoding.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing access token")]
    Missing,
    #[error("the access token is invalid or expired")]
    TooLarge,
    #[error("the access token is invalid or expired")]
    Expired,
    #[error("the access token is invalid or expired")]
    Invalid,
    #[error("the access token names no user")]
    NoSubject,
    #[error("signing secret is empty")]
    EmptySecret,
}

impl From<AuthError> for ChatError {
    fn from(e: AuthError) -> Self {
        ChatError::Auth(e.to_string())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish_non_exhaustive()
    }
}

impl Claims {
    pub fn user_id(&self) -> Option<UserId> {
        self.sub
            .as_deref()
            .or(self.jti.as_deref())
            .filter(|id| !id.trim().is_empty())
            .map(UserId::from_raw)
    }
}

fn non_empty(secret: &SecretString) -> Result<&[u8], AuthError> {
    let raw = secret.expose_secret();
    if raw.is_empty() {
        return Err(AuthError::EmptySecret);
    }
    Ok(raw.as_bytes())
}

/// Verifies tokens signed with the shared secret.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &SecretString) -> Result<Self, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Ok(Self {
            key: DecodingKey::from_secret(non_empty(secret)?),
            validation,
        })
    }

    /// Check size, signature and expiry, then return the user id.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            debug!(size = token.len(), "token rejected: too large");
            return Err(AuthError::TooLarge);
        }
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;
        data.claims.user_id().ok_or(AuthError::NoSubject)
    }
}

/// Mints tokens for operators and tests.
pub struct TokenIssuer {
    key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString) -> Result<Self, AuthError> {
        Ok(Self {
            key: EncodingKey::from_secret(non_empty(secret)?),
        })
    }

    pub fn issue(&self, user_id: &UserId, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        let claims = Claims {
            sub: Some(user_id.to_string()),
            jti: None,
            exp: now.saturating_add(ttl),
            iat: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key).map_err(|e| {
            debug!(error = %e, "token encoding failed");
            AuthError::Invalid
        })
    }
}
