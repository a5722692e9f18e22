use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

// --- Content ---

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    Text { value: String },
    Mention { user: User },
}

impl ContentSegment {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn mention(user: User) -> Self {
        Self::Mention { user }
    }

    pub fn is_mention(&self) -> bool {
        matches!(self, Self::Mention { .. })
    }

    /// Text as shown to clients: the literal span, or the mentioned user's name.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Text { value } => value,
            Self::Mention { user } => &user.name,
        }
    }

    /// Text as the author typed it (`@name` for mentions).
    pub fn literal(&self) -> String {
        match self {
            Self::Text { value } => value.clone(),
            Self::Mention { user } => format!("@{}", user.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub user: User,
    pub is_read: bool,
}

// --- Message ---

/// A persisted chat message.
///
/// `read_users` is frozen at creation: it holds one entry per user on the
/// roster at that moment, and entries only ever move from `false` to `true`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: User,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub contents: Vec<ContentSegment>,
    pub mentions: Vec<Mention>,
    pub read_users: BTreeMap<UserId, bool>,
}

impl Message {
    pub fn unread_count(&self) -> usize {
        self.read_users.values().filter(|read| !**read).count()
    }

    /// `None` when the user was not on the roster when the message was created.
    pub fn is_read_by(&self, user_id: &UserId) -> Option<bool> {
        self.read_users.get(user_id).copied()
    }

    /// Flip `user_id` to read, along with any mention of that user.
    ///
    /// Returns `true` only when an unread entry was flipped. Users missing
    /// from `read_users` are never added.
    pub fn mark_read_by(&mut self, user_id: &UserId) -> bool {
        match self.read_users.get_mut(user_id) {
            Some(read) if !*read => {
                *read = true;
                for mention in self.mentions.iter_mut().filter(|m| &m.user.id == user_id) {
                    mention.is_read = true;
                }
                true
            }
            _ => false,
        }
    }

    /// Reconstruct the text the sender typed.
    pub fn raw_text(&self) -> String {
        self.contents.iter().map(ContentSegment::literal).collect()
    }
}
