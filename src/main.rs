//! # mychat
//!
//! Single-room chat server binary. Wires settings, logging, storage, auth
//! and the WebSocket server together, plus a few operator commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing::{info, warn};

use mychat_auth::{TokenIssuer, TokenVerifier};
use mychat_core::{RoomId, UserId};
use mychat_engine::{ChatEngine, EngineConfig};
use mychat_server::metrics::install_recorder;
use mychat_server::{start, ServerConfig};
use mychat_settings::{data_dir, load_settings, load_settings_from_path, ChatSettings};
use mychat_store::{Database, SqliteChatStore};
use mychat_telemetry::{init_telemetry, LogQuery, LogRecord, SqliteLogSink, TelemetryConfig};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Single-room chat server.
#[derive(Parser, Debug)]
#[command(name = "mychat", about = "Single-room chat server")]
struct Cli {
    /// Settings file (defaults to ~/.mychat/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WebSocket server.
    Serve {
        /// Port to bind (0 for auto-assign). Overrides settings.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create a user.
    AddUser { name: String },
    /// List users in creation order.
    ListUsers,
    /// Show persisted warnings and errors, newest first.
    Logs {
        /// Only this level (warn or error).
        #[arg(long)]
        level: Option<String>,
        /// Only records logged inside this user's sessions.
        #[arg(long)]
        user: Option<String>,
        /// Only records from one connection.
        #[arg(long)]
        client: Option<String>,
        /// Only records at or after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// One JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Print an access token for a user.
    Token {
        user_id: String,
        /// Lifetime in seconds. Defaults to `auth.tokenTtlSecs`.
        #[arg(long)]
        ttl: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = read_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port } => serve(settings, port).await,
        Command::AddUser { name } => {
            let store = open_store(&settings)?;
            let user = store
                .users()
                .create(&name)
                .with_context(|| format!("failed to create user {name:?}"))?;
            println!("{}\t{}", user.id, user.name);
            Ok(())
        }
        Command::ListUsers => {
            let store = open_store(&settings)?;
            for user in store.users().list().context("failed to list users")? {
                println!("{}\t{}", user.id, user.name);
            }
            Ok(())
        }
        Command::Logs {
            level,
            user,
            client,
            since,
            limit,
            json,
        } => {
            let query = LogQuery {
                level,
                target: None,
                client_id: client,
                user_id: user,
                since,
                limit: Some(limit),
            };
            show_logs(&settings, &query, json)
        }
        Command::Token { user_id, ttl } => {
            let store = open_store(&settings)?;
            let user_id = UserId::from_raw(user_id);
            if store.users().get(&user_id)?.is_none() {
                bail!("no user with id {user_id}");
            }
            let ttl = ttl.map_or_else(|| settings.auth.token_ttl(), Duration::from_secs);
            let issuer = TokenIssuer::new(&jwt_secret(&settings)?)?;
            println!("{}", issuer.issue(&user_id, ttl)?);
            Ok(())
        }
    }
}

fn read_settings(path: Option<&Path>) -> Result<ChatSettings> {
    match path {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => load_settings().context("failed to load settings"),
    }
}

fn jwt_secret(settings: &ChatSettings) -> Result<SecretString> {
    settings
        .auth
        .jwt_secret()
        .cloned()
        .context("auth.jwtSecret is not set (or MYCHAT_JWT_SECRET)")
}

fn open_store(settings: &ChatSettings) -> Result<SqliteChatStore> {
    let path = settings.storage.resolve_db_path(&data_dir());
    let db = Database::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(SqliteChatStore::new(db).with_write_timeout(settings.storage.store_timeout()))
}

fn log_db_path(settings: &ChatSettings) -> PathBuf {
    let path = Path::new(&settings.logging.log_db_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir().join(path)
    }
}

fn telemetry_config(settings: &ChatSettings) -> Result<TelemetryConfig> {
    let mut config = TelemetryConfig::with_level_name(&settings.logging.level)?;
    config.json = settings.logging.json;
    if settings.logging.persist_warnings {
        config.sqlite_path = Some(log_db_path(settings));
    }
    Ok(config)
}

fn show_logs(settings: &ChatSettings, query: &LogQuery, json: bool) -> Result<()> {
    let path = log_db_path(settings);
    if !path.exists() {
        bail!("no log database at {} (is logging.persistWarnings on?)", path.display());
    }
    let sink = SqliteLogSink::open(&path)
        .with_context(|| format!("failed to open log database at {}", path.display()))?;
    let records = sink.query(query).context("failed to query logs")?;
    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!("{}", format_record(record));
        }
    }
    if !json {
        eprintln!("{} of {} records", records.len(), sink.count()?);
    }
    Ok(())
}

fn format_record(record: &LogRecord) -> String {
    let mut line = format!(
        "{} {:<5} {} {}",
        record.timestamp, record.level, record.target, record.message
    );
    if let Some(user_id) = &record.user_id {
        line.push_str(&format!(" user={user_id}"));
    }
    if let Some(client_id) = &record.client_id {
        line.push_str(&format!(" client={client_id}"));
    }
    if let Some(fields) = &record.fields {
        line.push(' ');
        line.push_str(fields);
    }
    line
}

async fn serve(mut settings: ChatSettings, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        settings.server.port = port;
    }
    settings.validate().context("invalid settings")?;

    let _telemetry =
        init_telemetry(&telemetry_config(&settings)?).context("failed to initialise logging")?;

    let store = open_store(&settings)?;
    let room = store
        .rooms()
        .ensure(&RoomId::from_raw(settings.room.id.as_str()), &settings.room.name)
        .context("failed to create the room")?;

    let engine = Arc::new(ChatEngine::new(
        Arc::new(store),
        EngineConfig {
            room_id: room.id.clone(),
            store_timeout: settings.storage.store_timeout(),
        },
    ));
    let verifier = TokenVerifier::new(&jwt_secret(&settings)?)?;

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let handle = start(ServerConfig::from(&settings.server), engine, verifier, metrics)
        .await
        .context("failed to start server")?;
    info!(addr = %handle.addr, room = %room.name, "mychat ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.shutdown(SHUTDOWN_TIMEOUT).await;
    info!("shutdown complete");
    Ok(())
}
