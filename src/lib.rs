//! pebble.chat - Messaging client sync core
//!
//! Client-side conversation synchronization engine for a desktop
//! messaging client: the conversation-list cache and the active-thread
//! message cache, reconciling optimistic local mutations against
//! asynchronous, out-of-order server responses. Rendering, transport, and
//! persistence live elsewhere; the server is reached only through the
//! [`RemoteGateway`] trait.
//!
//! ## Module Organization
//!
//! - `config/`: runtime tuning (page sizes, refresh gating, timing)
//! - `gateway/`: abstract asynchronous server gateway
//! - `services/`: the conversation and thread stores, shared selection
//! - `types/`: data structures, store events, and errors
//!
//! ## Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use pebble_chat_core::{
//!     ActiveChat, ConversationStore, RemoteGateway, SyncTuning, ThreadStore,
//! };
//! use pebble_chat_core::types::EventSink;
//!
//! fn wire(gateway: Arc<dyn RemoteGateway>) -> (Arc<ConversationStore>, Arc<ThreadStore>) {
//!     let selection = Arc::new(ActiveChat::new());
//!     let (events, _rx) = EventSink::channel();
//!     let tuning = SyncTuning::load();
//!     let conversations = Arc::new(ConversationStore::new(
//!         gateway.clone(),
//!         selection.clone(),
//!         events.clone(),
//!         tuning.clone(),
//!     ));
//!     let thread = Arc::new(ThreadStore::new(
//!         gateway,
//!         conversations.clone(),
//!         selection,
//!         events,
//!         tuning,
//!     ));
//!     (conversations, thread)
//! }
//! ```

pub mod config;
pub mod gateway;
pub mod services;
pub mod types;

pub use config::SyncTuning;
pub use gateway::RemoteGateway;
pub use services::{ActiveChat, ConversationStore, ThreadStore};
pub use types::{
    ChatError, ChatId, ConversationSummary, Message, MessageId, Result, StoreEvent,
};
