//! Database and room settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file. Relative paths resolve against the data directory.
    pub db_path: String,
    /// Upper bound on each store call.
    pub store_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "chat.db".to_string(),
            store_timeout_ms: 5_000,
        }
    }
}

impl StorageSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn resolve_db_path(&self, data_dir: &Path) -> PathBuf {
        let path = Path::new(&self.db_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(SettingsError::invalid("storage.dbPath", "must not be empty"));
        }
        if self.store_timeout_ms == 0 {
            return Err(SettingsError::invalid("storage.storeTimeoutMs", "must be non-zero"));
        }
        Ok(())
    }
}

/// The single room all messages belong to. Created at startup if absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    pub id: String,
    pub name: String,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            id: "root".to_string(),
            name: "root".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_db_path_joins_data_dir() {
        let s = StorageSettings::default();
        assert_eq!(
            s.resolve_db_path(Path::new("/var/lib/mychat")),
            PathBuf::from("/var/lib/mychat/chat.db")
        );
    }

    #[test]
    fn absolute_db_path_kept() {
        let s = StorageSettings {
            db_path: "/tmp/other.db".into(),
            ..StorageSettings::default()
        };
        assert_eq!(
            s.resolve_db_path(Path::new("/var/lib/mychat")),
            PathBuf::from("/tmp/other.db")
        );
    }
}
