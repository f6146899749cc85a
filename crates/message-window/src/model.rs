use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Server-assigned message identifier. IDs grow monotonically within a chat.
pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Group,
    Channel,
    Private,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Group => "group",
            ChatKind::Channel => "channel",
            ChatKind::Private => "private",
        }
    }
}

/// The conversation a window is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatTarget {
    pub id: u64,
    pub kind: ChatKind,
}

impl ChatTarget {
    pub fn new(id: u64, kind: ChatKind) -> Self {
        Self { id, kind }
    }

    pub fn group(id: u64) -> Self {
        Self::new(id, ChatKind::Group)
    }

    pub fn channel(id: u64) -> Self {
        Self::new(id, ChatKind::Channel)
    }

    pub fn private(id: u64) -> Self {
        Self::new(id, ChatKind::Private)
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub chat: ChatTarget,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub sender: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Monotonic token identifying one reset-to-reset lifetime of the window.
///
/// Every fetch captures the token it was issued under; a response whose token
/// no longer matches the window is discarded instead of merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub u64);

impl SessionToken {
    pub fn next(self) -> Self {
        SessionToken(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
