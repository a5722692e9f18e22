//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ChatSettings;

/// `$MYCHAT_HOME`, or `~/.mychat`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MYCHAT_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mychat")
}

pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChatSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChatSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<ChatSettings> {
    let json_err = |source| SettingsError::Json {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(ChatSettings::default()).map_err(json_err)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(json_err)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(json_err)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `MYCHAT_*` environment variables.
pub fn apply_env_overrides(settings: &mut ChatSettings) {
    apply_overrides_with(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and
/// ignored, keeping the file/default value.
pub fn apply_overrides_with<F>(settings: &mut ChatSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("MYCHAT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("MYCHAT_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("MYCHAT_MAX_SEND_QUEUE", 1, 1_000_000) {
        settings.server.max_send_queue = v;
    }
    if let Some(v) = env.u64("MYCHAT_SEND_TIMEOUT_MS", 10, 600_000) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = env.u64("MYCHAT_HEARTBEAT_INTERVAL_SECS", 1, 3_600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64("MYCHAT_CLIENT_TIMEOUT_SECS", 2, 86_400) {
        settings.server.client_timeout_secs = v;
    }

    // ── Storage & room ──────────────────────────────────────────────
    if let Some(v) = env.string("MYCHAT_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = env.u64("MYCHAT_STORE_TIMEOUT_MS", 10, 600_000) {
        settings.storage.store_timeout_ms = v;
    }
    if let Some(v) = env.string("MYCHAT_ROOM_ID") {
        settings.room.id = v;
    }
    if let Some(v) = env.string("MYCHAT_ROOM_NAME") {
        settings.room.name = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("MYCHAT_JWT_SECRET") {
        settings.auth.jwt_secret = Some(SecretString::from(v));
    }
    if let Some(v) = env.u64("MYCHAT_TOKEN_TTL_SECS", 1, 31_536_000) {
        settings.auth.token_ttl_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("MYCHAT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("MYCHAT_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.bool("MYCHAT_LOG_PERSIST") {
        settings.logging.persist_warnings = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}
