//! Abstract gateway to the remote messaging server
//!
//! The stores never talk to a transport directly; everything flows through
//! this trait. Implementations own connection handling, retries, and
//! timeouts, and are expected to reject (`Network`/`Timeout`) rather than
//! hang; the stores run no timers of their own.

use async_trait::async_trait;

use crate::types::{ChatId, ConversationPatch, ConversationSummary, Message, Result};

/// Asynchronous operations the sync core needs from the server.
///
/// All fetch operations are idempotent. `send_message` is not: a retry
/// creates a new message server-side, which is why the stores never
/// re-issue a send for an existing optimistic record.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fetch a page of conversation summaries ordered by latest activity.
    async fn fetch_conversations(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>>;

    /// Fetch the freshest `window` conversation summaries.
    async fn refresh_conversations(&self, window: usize) -> Result<Vec<ConversationSummary>>;

    /// Fetch a page of messages, newest first. `offset = None` requests
    /// the newest page.
    async fn fetch_messages(
        &self,
        chat_id: &ChatId,
        offset: Option<usize>,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Send a text message; resolves to the confirmed server record.
    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        effect: Option<&str>,
    ) -> Result<Message>;

    /// Mark every message in the chat read.
    async fn mark_read(&self, chat_id: &ChatId) -> Result<()>;

    /// Flag the chat unread for the user.
    async fn mark_unread(&self, chat_id: &ChatId) -> Result<()>;

    /// Apply a partial flag update (pin/mute/archive) to the chat.
    async fn update_conversation(&self, chat_id: &ChatId, patch: &ConversationPatch) -> Result<()>;
}
