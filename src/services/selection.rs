//! Currently selected chat
//!
//! Single source of truth consulted by both stores: the thread store keeps
//! it in step with the open conversation, and the conversation store reads
//! it for unread suppression. Held separately so neither store owns the
//! other.

use std::sync::RwLock;

use crate::types::ChatId;

/// Shared handle to the currently open conversation, if any.
#[derive(Debug, Default)]
pub struct ActiveChat {
    current: RwLock<Option<ChatId>>,
}

impl ActiveChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// The selected chat id, if a conversation is open.
    pub fn get(&self) -> Option<ChatId> {
        self.current.read().unwrap().clone()
    }

    /// True when `chat_id` is the open conversation.
    pub fn is_selected(&self, chat_id: &ChatId) -> bool {
        self.current.read().unwrap().as_ref() == Some(chat_id)
    }

    pub fn select(&self, chat_id: Option<ChatId>) {
        *self.current.write().unwrap() = chat_id;
    }
}
