pub mod chat_store;
pub mod database;
pub mod error;
pub mod messages;
pub mod rooms;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use chat_store::SqliteChatStore;
pub use database::Database;
pub use error::DbError;
