//! Store services
//!
//! Business logic for the two caches and the shared selection handle.
//! Stores are constructed with an injected gateway and shared via `Arc`;
//! there is no ambient global instance.

pub mod conversation_store;
pub mod selection;
pub mod thread_store;

pub use conversation_store::ConversationStore;
pub use selection::ActiveChat;
pub use thread_store::ThreadStore;
