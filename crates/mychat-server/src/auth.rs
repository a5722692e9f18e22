//! Authentication of WebSocket upgrades and per-request tokens.

use axum::http::{header, HeaderMap, StatusCode};
use serde::Deserialize;
use tracing::debug;

use mychat_auth::{AuthError, TokenVerifier};
use mychat_core::{ChatError, User};
use mychat_engine::ChatEngine;

/// Query string accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// The `token` query parameter wins over an `Authorization: Bearer` header.
pub fn extract_token<'a>(params: &'a ConnectParams, headers: &'a HeaderMap) -> Option<&'a str> {
    if let Some(token) = params.token.as_deref().filter(|t| !t.trim().is_empty()) {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the token and load the user it names.
pub async fn authenticate(
    verifier: &TokenVerifier,
    engine: &ChatEngine,
    token: Option<&str>,
) -> Result<User, ChatError> {
    let user_id = verifier.verify(token.ok_or(AuthError::Missing)?)?;
    engine.user(&user_id).await.map_err(|e| match e {
        ChatError::NotFound { .. } => {
            debug!(user_id = %user_id, "token names an unknown user");
            ChatError::Auth("unknown user".into())
        }
        other => other,
    })
}

/// Status for a refused upgrade.
pub fn rejection_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// A request-level `fromToken` must name the session's own user.
pub fn check_request_token(
    verifier: &TokenVerifier,
    session_user: &User,
    token: &str,
) -> Result<(), ChatError> {
    let user_id = verifier.verify(token)?;
    if user_id != session_user.id {
        return Err(ChatError::Auth("token does not match the connected user".into()));
    }
    Ok(())
}
