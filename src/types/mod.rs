//! Data structures shared across the sync core.

pub mod conversation;
pub mod error;
pub mod message;

use serde::{Deserialize, Serialize};

pub use conversation::{ConversationPatch, ConversationSummary, Preview};
pub use error::{ChatError, Result};
pub use message::{Attachment, Message, MessageId, Reaction};

/// Stable server-side conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(guid: &str) -> Self {
        Self(guid.to_string())
    }
}

/// Pagination cursor for one cache.
///
/// `has_more` latches false once a fetch returns fewer items than the page
/// size and stays false until the next [`reset`](PageCursor::reset).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageCursor {
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl PageCursor {
    pub fn new(limit: usize) -> Self {
        Self {
            offset: 0,
            limit,
            has_more: true,
        }
    }

    /// Record a completed page fetch of `returned` items.
    pub fn advance(&mut self, returned: usize) {
        self.offset += returned;
        if returned < self.limit {
            self.has_more = false;
        }
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.has_more = true;
    }
}

/// Notifications emitted by the stores for the embedding shell.
///
/// These describe processed state changes, not raw gateway traffic;
/// consumers decide how to render them.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Conversation list contents or ordering changed.
    ConversationsChanged,
    /// A single conversation's flags or preview changed.
    ConversationUpdated { chat_id: ChatId },
    /// The active thread's message list changed.
    ThreadChanged { chat_id: ChatId },
    /// An outgoing message failed permanently.
    SendFailed {
        chat_id: ChatId,
        message_id: MessageId,
        error: String,
    },
    /// A background read/unread verify failed and local state was kept.
    FlagVerifyFailed { chat_id: ChatId, error: String },
}

/// Sending half of the store notification channel.
///
/// Emission is fire-and-forget; a dropped receiver is tolerated.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: flume::Sender<StoreEvent>,
}

impl EventSink {
    /// Create a sink plus the receiver the shell consumes.
    pub fn channel() -> (Self, flume::Receiver<StoreEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}
