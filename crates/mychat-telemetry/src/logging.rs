use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A warning or error persisted to SQLite.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
}

/// Filters for [`SqliteLogSink::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite sink that persists warn+ logs.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn open(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS logs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 client_id TEXT,
                 user_id TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
             CREATE INDEX IF NOT EXISTS idx_logs_user ON logs(user_id);
             CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, record: &LogInsert) {
        let conn = self.conn.lock();
        // A failing log write has nowhere to be reported.
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, client_id, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.timestamp,
                record.level,
                record.target,
                record.message,
                record.fields,
                record.client_id,
                record.user_id,
            ],
        );
    }

    /// Newest first.
    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, client_id, user_id
             FROM logs WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        let mut filter = |clause: &str, value: String| {
            sql.push_str(&format!(" AND {clause} ?{}", params.len() + 1));
            params.push(Box::new(value));
        };
        if let Some(level) = &q.level {
            filter("level =", level.to_uppercase());
        }
        if let Some(target) = &q.target {
            filter("target LIKE", format!("%{target}%"));
        }
        if let Some(client_id) = &q.client_id {
            filter("client_id =", client_id.clone());
        }
        if let Some(user_id) = &q.user_id {
            filter("user_id =", user_id.clone());
        }
        if let Some(since) = &q.since {
            filter("timestamp >=", since.clone());
        }

        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100)));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                client_id: row.get(6)?,
                user_id: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

struct LogInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    client_id: Option<String>,
    user_id: Option<String>,
}

/// tracing Layer that writes warn+ events to a [`SqliteLogSink`].
///
/// `client_id` and `user_id` are lifted out of the event or, failing
/// that, out of the nearest enclosing span that recorded them.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    ids: ConnectionIds,
}

/// Stored on spans so child events inherit the connection's identity.
#[derive(Clone, Default)]
struct ConnectionIds {
    client_id: Option<String>,
    user_id: Option<String>,
}

impl ConnectionIds {
    fn is_empty(&self) -> bool {
        self.client_id.is_none() && self.user_id.is_none()
    }

    fn fill_from(&mut self, other: &ConnectionIds) {
        if self.client_id.is_none() {
            self.client_id.clone_from(&other.client_id);
        }
        if self.user_id.is_none() {
            self.user_id.clone_from(&other.user_id);
        }
    }
}

impl FieldVisitor {
    fn put(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            "client_id" => self.ids.client_id = Some(value),
            "user_id" => self.ids.user_id = Some(value),
            other => {
                let _ = self
                    .fields
                    .insert(other.to_string(), serde_json::Value::String(value));
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        self.put(field.name(), val.trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        let _ = self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let _ = self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        let _ = self.fields.insert(field.name().to_string(), value.into());
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(ids) = span.extensions().get::<ConnectionIds>() {
                    visitor.ids.fill_from(ids);
                }
            }
        }

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        self.sink.insert(&LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
            client_id: visitor.ids.client_id,
            user_id: visitor.ids.user_id,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if visitor.ids.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::subscriber::with_default;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    fn record(level: &str, message: &str) -> LogInsert {
        LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.into(),
            target: "mychat_server::session".into(),
            message: message.into(),
            fields: None,
            client_id: None,
            user_id: None,
        }
    }

    fn with_layer(f: impl FnOnce()) -> Arc<SqliteLogSink> {
        let sink = Arc::new(SqliteLogSink::in_memory().unwrap());
        let subscriber =
            tracing_subscriber::registry().with(SqliteLogLayer::new(sink.clone()));
        with_default(subscriber, f);
        sink
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs.db");
        let sink = SqliteLogSink::open(&path).unwrap();
        sink.insert(&record("WARN", "hello"));
        assert_eq!(sink.count().unwrap(), 1);
        assert!(path.exists());
    }

    #[test]
    fn query_filters() {
        let sink = SqliteLogSink::in_memory().unwrap();
        sink.insert(&record("WARN", "slow client"));
        sink.insert(&LogInsert {
            user_id: Some("user_alice".into()),
            ..record("ERROR", "store down")
        });

        let errors = sink
            .query(&LogQuery {
                level: Some("error".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "store down");

        let alice = sink
            .query(&LogQuery {
                user_id: Some("user_alice".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(alice.len(), 1);

        let by_target = sink
            .query(&LogQuery {
                target: Some("session".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_target.len(), 2);
    }

    #[test]
    fn query_limit_newest_first() {
        let sink = SqliteLogSink::in_memory().unwrap();
        for i in 0..10 {
            sink.insert(&record("WARN", &format!("msg {i}")));
        }
        let results = sink
            .query(&LogQuery {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].message, "msg 9");
    }

    #[test]
    fn layer_persists_only_warn_and_above() {
        let sink = with_layer(|| {
            tracing::info!("connected");
            tracing::debug!("noise");
            tracing::warn!(queue = 256_u64, "send queue full");
            tracing::error!("store unavailable");
        });
        assert_eq!(sink.count().unwrap(), 2);
        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows[1].message, "send queue full");
        assert_eq!(rows[1].fields.as_deref(), Some(r#"{"queue":256}"#));
    }

    #[test]
    fn layer_inherits_ids_from_span() {
        let sink = with_layer(|| {
            let span = tracing::info_span!("session", client_id = "client_1", user_id = "user_bob");
            let _entered = span.enter();
            tracing::warn!("dropping slow client");
            tracing::warn!(user_id = "user_override", "explicit wins");
        });
        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].client_id.as_deref(), Some("client_1"));
        assert_eq!(rows[1].user_id.as_deref(), Some("user_bob"));
        assert_eq!(rows[0].user_id.as_deref(), Some("user_override"));
        assert_eq!(rows[0].client_id.as_deref(), Some("client_1"));
    }
}
