use crate::model::{ChatKind, ChatTarget, MessageId, MessageRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which side of the cursor a page should come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageDirection {
    Older,
    Newer,
    None,
}

/// One page query against the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub chat_id: u64,
    pub chat_kind: ChatKind,
    pub page_size: u32,
    pub cursor: Option<MessageId>,
    pub direction: PageDirection,
    /// With a cursor, asks for records on both sides of it (the cursor included).
    pub both_directions: bool,
}

impl FetchRequest {
    /// Most recent page; the store picks the range.
    pub fn latest(chat: ChatTarget, page_size: u32) -> Self {
        Self {
            chat_id: chat.id,
            chat_kind: chat.kind,
            page_size,
            cursor: None,
            direction: PageDirection::None,
            both_directions: false,
        }
    }

    pub fn older(chat: ChatTarget, page_size: u32, cursor: MessageId) -> Self {
        Self {
            cursor: Some(cursor),
            direction: PageDirection::Older,
            ..Self::latest(chat, page_size)
        }
    }

    pub fn newer(chat: ChatTarget, page_size: u32, cursor: MessageId) -> Self {
        Self {
            cursor: Some(cursor),
            direction: PageDirection::Newer,
            ..Self::latest(chat, page_size)
        }
    }

    pub fn around(chat: ChatTarget, page_size: u32, target: MessageId) -> Self {
        Self {
            cursor: Some(target),
            both_directions: true,
            ..Self::latest(chat, page_size)
        }
    }

    pub fn chat(&self) -> ChatTarget {
        ChatTarget::new(self.chat_id, self.chat_kind)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },
}

impl SourceError {
    /// Transport failures and server-side (5xx) rejections may succeed on a
    /// later user-initiated retry; client-side rejections will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Rejected { status, .. } => *status >= 500,
        }
    }
}

/// The store the window pages history from.
///
/// Implementations must return, for one call, records forming a contiguous
/// run of IDs with no internal holes; the window records the whole span
/// between the smallest and largest returned ID as covered.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<MessageRecord>, SourceError>;
}
