//! Wire payloads exchanged with clients.

use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::ids::MessageId;
use crate::model::Message;

// --- Inbound ---

/// A client request, tagged by `op`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Create {
        #[serde(alias = "message")]
        value: String,
        #[serde(default, rename = "fromToken")]
        from_token: Option<String>,
    },
    Read {
        #[serde(default)]
        target: Option<String>,
        #[serde(default, rename = "fromToken")]
        from_token: Option<String>,
    },
    /// Any op this server does not know. Ignored.
    #[serde(other)]
    Unknown,
}

/// What a `read` request applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadTarget {
    One(MessageId),
    AllPending,
}

impl Request {
    pub fn decode(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text).map_err(|e| ChatError::Decode(e.to_string()))
    }

    pub fn from_token(&self) -> Option<&str> {
        match self {
            Self::Create { from_token, .. } | Self::Read { from_token, .. } => {
                from_token.as_deref()
            }
            Self::Unknown => None,
        }
    }
}

impl ReadTarget {
    /// A missing, blank or `"all"` target means every pending message.
    pub fn parse(target: Option<&str>) -> Self {
        match target.map(str::trim) {
            None | Some("") | Some("all") => Self::AllPending,
            Some(id) => Self::One(MessageId::from_raw(id)),
        }
    }
}

// --- Outbound ---

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    pub is_user: bool,
    pub text: String,
}

/// One message as broadcast to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub username: String,
    pub un_read_count: u64,
    pub contents: Vec<ContentPayload>,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            username: message.sender.name.clone(),
            un_read_count: message.unread_count() as u64,
            contents: message
                .contents
                .iter()
                .map(|segment| ContentPayload {
                    is_user: segment.is_mention(),
                    text: segment.display_text().to_string(),
                })
                .collect(),
        }
    }
}

impl MessagePayload {
    pub fn render(message: &Message) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Self::from(message))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Sent only to the session whose request failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub error: ErrorBody,
}

impl From<&ChatError> for ErrorNotice {
    fn from(err: &ChatError) -> Self {
        Self {
            error: ErrorBody {
                code: err.error_kind().to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl ErrorNotice {
    pub fn render(err: &ChatError) -> String {
        let notice = Self::from(err);
        serde_json::to_string(&notice).unwrap_or_else(|_| {
            format!(r#"{{"error":{{"code":"{}","message":""}}}}"#, notice.error.code)
        })
    }
}
