//! Domain types and pure logic shared by every mychat crate.

pub mod errors;
pub mod ids;
pub mod model;
pub mod protocol;
pub mod segment;
pub mod store;

pub use errors::{ChatError, StoreError};
pub use ids::{ClientId, MessageId, RoomId, UserId};
pub use model::{ContentSegment, Mention, Message, Room, User};
pub use store::{ChatStore, SharedStore};
