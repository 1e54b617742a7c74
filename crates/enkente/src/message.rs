//! Chat-turn message model shared by every producer and consumer.

use std::fmt;

use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Session id stamped on messages received over HTTP.
pub const LIVE_SESSION_ID: &str = "live";

/// Role of the author of a chat turn.
///
/// Only `user` and `system` are interpreted; anything else is carried through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    User,
    System,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::User => "user",
            MessageKind::System => "system",
            MessageKind::Other(value) => value,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, MessageKind::User)
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => MessageKind::User,
            "system" => MessageKind::System,
            _ => MessageKind::Other(value),
        }
    }
}

impl From<&str> for MessageKind {
    fn from(value: &str) -> Self {
        MessageKind::from(value.to_string())
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(value) => value,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat turn, as written to the log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Groups the turns of one conversation.
    #[serde(rename = "sessionId")]
    pub session_id: String,

    /// 0-based position within the source log. Always 0 for live messages.
    #[serde(rename = "messageId")]
    pub sequence: u64,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(rename = "message")]
    pub body: String,

    /// Keeps the offset it was written with. Absent or null timestamps decode to
    /// the Unix epoch.
    #[serde(default = "unix_epoch", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<FixedOffset>,
}

impl Message {
    /// Build a message that arrived over the network, stamped with the current
    /// local time.
    pub fn live(kind: impl Into<MessageKind>, body: impl Into<String>) -> Self {
        Self {
            session_id: LIVE_SESSION_ID.to_string(),
            sequence: 0,
            kind: kind.into(),
            body: body.into(),
            timestamp: Local::now().fixed_offset(),
        }
    }
}

fn unix_epoch() -> DateTime<FixedOffset> {
    DateTime::<Utc>::UNIX_EPOCH.fixed_offset()
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<FixedOffset>>::deserialize(deserializer)?.unwrap_or_else(unix_epoch))
}
