use mychat_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("connection still busy at deadline")]
    LockTimeout,
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::Conflict(e.to_string())
            }
            _ => DbError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Database(msg) | DbError::Io(msg) => StoreError::Unavailable(msg),
            DbError::Conflict(msg) => StoreError::Conflict(msg),
            DbError::NotFound(msg) | DbError::Serialization(msg) => StoreError::Corrupt(msg),
            DbError::LockTimeout => StoreError::Unavailable("connection busy".into()),
            corrupt @ DbError::CorruptRow { .. } => StoreError::Corrupt(corrupt.to_string()),
        }
    }
}
