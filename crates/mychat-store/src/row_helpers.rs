use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Parse a JSON text column into `T`, returning CorruptRow on failure.
pub fn parse_json<T: DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Map a "no rows" error to `None`, keeping every other error.
pub fn optional<T>(result: Result<T, rusqlite::Error>) -> Result<Option<T>, DbError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
