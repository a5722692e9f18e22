use std::time::Duration;

/// Failure reported by a persistence backend.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Error taxonomy for the message distribution pipeline.
///
/// None of these are fatal to the process: decode and auth failures drop a
/// request or a connection, storage failures fail one operation, transport
/// failures remove one session.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChatError {
    #[error("malformed request: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChatError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Short classification string for logging, metrics and error notices.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Auth(_) => "auth_error",
            Self::NotFound { .. } => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Transport(_) => "transport_error",
        }
    }
}
