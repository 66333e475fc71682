//! Active-thread message store
//!
//! In-memory cache of the open conversation's messages: newest-first
//! pagination, optimistic sends reconciled against the server's confirmed
//! records, and a generation token that discards any load completing for a
//! thread the user has already left.
//!
//! Lock discipline matches the conversation store: state guards are only
//! held for synchronous sections, never across a gateway await.

use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SyncTuning;
use crate::gateway::RemoteGateway;
use crate::services::conversation_store::ConversationStore;
use crate::services::selection::ActiveChat;
use crate::types::{
    ChatError, ChatId, EventSink, Message, MessageId, PageCursor, Result, StoreEvent,
};

#[derive(Debug)]
struct ThreadState {
    chat_id: Option<ChatId>,
    /// Newest first.
    messages: Vec<Message>,
    cursor: PageCursor,
    loading: bool,
    /// Bumped by every `load_messages`; a completing load whose token no
    /// longer matches is discarded whole.
    generation: u64,
    next_temp_seq: u64,
}

/// Message cache for the currently open conversation.
pub struct ThreadStore {
    gateway: Arc<dyn RemoteGateway>,
    conversations: Arc<ConversationStore>,
    selection: Arc<ActiveChat>,
    events: EventSink,
    tuning: SyncTuning,
    state: RwLock<ThreadState>,
    /// Delayed post-send reconciliation fetch; aborted on chat switch so a
    /// stray reconcile never fires against a thread the user left.
    reconcile: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadStore {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        conversations: Arc<ConversationStore>,
        selection: Arc<ActiveChat>,
        events: EventSink,
        tuning: SyncTuning,
    ) -> Self {
        let cursor = PageCursor::new(tuning.thread_page_size);
        Self {
            gateway,
            conversations,
            selection,
            events,
            tuning,
            state: RwLock::new(ThreadState {
                chat_id: None,
                messages: Vec::new(),
                cursor,
                loading: false,
                generation: 0,
                next_temp_seq: 0,
            }),
            reconcile: Mutex::new(None),
        }
    }

    /// Snapshot of the current thread, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.state.read().unwrap().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.read().unwrap().messages.len()
    }

    /// The chat this store currently holds, if any.
    pub fn active_chat(&self) -> Option<ChatId> {
        self.state.read().unwrap().chat_id.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state.read().unwrap().cursor.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().unwrap().loading
    }

    /// Open `chat_id` and load its newest page.
    ///
    /// Issues a fresh generation token. If a newer `load_messages` runs
    /// before this one completes, the completion is discarded
    /// unconditionally: no partial application, no error. On apply,
    /// still-pending optimistic messages for this chat stay ahead of the
    /// fetched page, deduplicated against it by id.
    pub async fn load_messages(self: &Arc<Self>, chat_id: &ChatId) -> Result<()> {
        self.cancel_reconcile();

        let generation = {
            let mut state = self.state.write().unwrap();
            state.generation += 1;
            if state.chat_id.as_ref() != Some(chat_id) {
                // Switching threads drops the old chat's optimistic
                // entries along with everything else.
                state.messages.clear();
            }
            state.chat_id = Some(chat_id.clone());
            state.cursor.reset();
            state.loading = true;
            state.generation
        };
        self.selection.select(Some(chat_id.clone()));

        let result = self
            .gateway
            .fetch_messages(chat_id, None, self.tuning.thread_page_size)
            .await;

        let mut state = self.state.write().unwrap();
        if state.generation != generation {
            debug!(
                "discarding stale thread load for {chat_id} (gen {generation}, current {})",
                state.generation
            );
            return Ok(());
        }
        state.loading = false;
        let page = result?;
        debug!("loaded {} messages for {chat_id}", page.len());
        state.cursor.advance(page.len());

        let mut merged: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.id.is_temp())
            .cloned()
            .collect();
        let fresh: Vec<Message> = page
            .into_iter()
            .filter(|fetched| merged.iter().all(|held| held.id != fetched.id))
            .collect();
        merged.extend(fresh);
        state.messages = merged;
        drop(state);

        self.events.emit(StoreEvent::ThreadChanged {
            chat_id: chat_id.clone(),
        });
        Ok(())
    }

    /// Fetch the next (older) page and append it.
    ///
    /// No-op while a load is in flight, once the thread is exhausted, or
    /// when no chat is open.
    pub async fn load_older(&self) -> Result<()> {
        let (chat_id, offset, limit, generation) = {
            let mut state = self.state.write().unwrap();
            let Some(chat_id) = state.chat_id.clone() else {
                debug!("load_older skipped: no active chat");
                return Ok(());
            };
            if state.loading || !state.cursor.has_more {
                debug!("load_older skipped (loading or exhausted)");
                return Ok(());
            }
            state.loading = true;
            (chat_id, state.cursor.offset, state.cursor.limit, state.generation)
        };

        let result = self.gateway.fetch_messages(&chat_id, Some(offset), limit).await;

        let mut state = self.state.write().unwrap();
        if state.generation != generation {
            // The thread switched mid-flight; this page belongs to a view
            // that no longer exists.
            debug!("discarding stale older-page load for {chat_id}");
            return Ok(());
        }
        state.loading = false;
        let page = result?;
        state.cursor.advance(page.len());

        for message in page {
            if state.messages.iter().all(|held| held.id != message.id) {
                state.messages.push(message);
            }
        }
        drop(state);

        self.events.emit(StoreEvent::ThreadChanged { chat_id });
        Ok(())
    }

    /// Send a text message to the open chat.
    ///
    /// An optimistic record appears at the head of the thread (and in the
    /// conversation preview) before the gateway is called. Success swaps
    /// the record in place for the confirmed one and schedules a delayed
    /// reconciliation fetch; failure marks the record errored and keeps
    /// it. Returns the confirmed message id.
    pub async fn send(self: &Arc<Self>, text: &str, effect: Option<&str>) -> Result<MessageId> {
        let (chat_id, temp_id, optimistic) = {
            let mut state = self.state.write().unwrap();
            let Some(chat_id) = state.chat_id.clone() else {
                return Err(ChatError::InvalidInput("no active chat to send to".into()));
            };
            state.next_temp_seq += 1;
            let message = Message::outgoing(
                state.next_temp_seq,
                chat_id.clone(),
                text,
                effect.map(str::to_string),
            );
            let temp_id = message.id.clone();
            state.messages.insert(0, message.clone());
            (chat_id, temp_id, message)
        };
        // Same logical step as the optimistic insert: the list preview
        // must never lag the thread head.
        self.conversations.update_preview(&chat_id, &optimistic);
        self.events.emit(StoreEvent::ThreadChanged {
            chat_id: chat_id.clone(),
        });

        match self.gateway.send_message(&chat_id, text, effect).await {
            Ok(confirmed) => {
                {
                    let mut state = self.state.write().unwrap();
                    if state.chat_id.as_ref() == Some(&chat_id) {
                        if let Some(slot) =
                            state.messages.iter_mut().find(|m| m.id == temp_id)
                        {
                            *slot = confirmed.clone();
                        } else {
                            // The optimistic target vanished (thread was
                            // reset mid-flight); the confirmed record will
                            // arrive with the next load.
                            debug!("optimistic target {temp_id} missing, skipping swap");
                        }
                    }
                }
                debug!("message sent to {chat_id}: {}", confirmed.id);
                self.conversations.update_preview(&chat_id, &confirmed);
                self.events.emit(StoreEvent::ThreadChanged {
                    chat_id: chat_id.clone(),
                });
                self.schedule_reconcile(&chat_id);
                Ok(confirmed.id)
            }
            Err(e) => {
                {
                    let mut state = self.state.write().unwrap();
                    if let Some(slot) = state.messages.iter_mut().find(|m| m.id == temp_id) {
                        slot.send_error = Some(e.to_string());
                    }
                }
                warn!("send failed for {chat_id}: {e}");
                self.events.emit(StoreEvent::SendFailed {
                    chat_id: chat_id.clone(),
                    message_id: temp_id,
                    error: e.to_string(),
                });
                self.events.emit(StoreEvent::ThreadChanged { chat_id });
                Err(e)
            }
        }
    }

    /// Retry an errored optimistic message.
    ///
    /// A retry is a brand-new send with a fresh id; the errored record
    /// stays as history and is never resurrected.
    pub async fn resend(self: &Arc<Self>, failed_id: &MessageId) -> Result<MessageId> {
        let (text, effect) = {
            let state = self.state.read().unwrap();
            let Some(message) = state.messages.iter().find(|m| &m.id == failed_id) else {
                return Err(ChatError::MessageNotFound(failed_id.to_string()));
            };
            if message.send_error.is_none() {
                return Err(ChatError::InvalidInput(
                    "message is not in a failed state".into(),
                ));
            }
            (
                message.text.clone().unwrap_or_default(),
                message.effect.clone(),
            )
        };
        self.send(&text, effect.as_deref()).await
    }

    /// Apply a message pushed by the server (new message, delivery/read
    /// receipt, edit).
    ///
    /// For the open thread an id match replaces the record in place and a
    /// new id is inserted at the head. The conversation preview is updated
    /// in the same step whenever the message is the thread head, or
    /// whenever it belongs to a background chat.
    pub fn apply_incoming(&self, message: &Message) {
        let mut touched_thread = false;
        let mut update_preview = true;
        {
            let mut state = self.state.write().unwrap();
            if state.chat_id.as_ref() == Some(&message.chat_id) {
                touched_thread = true;
                if let Some(pos) = state.messages.iter().position(|m| m.id == message.id) {
                    state.messages[pos] = message.clone();
                    // A receipt landing mid-list is not a new latest
                    // message; leave the preview alone.
                    update_preview = pos == 0;
                } else {
                    state.messages.insert(0, message.clone());
                }
            }
        }

        if update_preview {
            self.conversations.update_preview(&message.chat_id, message);
        }
        if touched_thread {
            self.events.emit(StoreEvent::ThreadChanged {
                chat_id: message.chat_id.clone(),
            });
        }
    }

    /// Close the thread view: clears messages, invalidates in-flight
    /// loads, and cancels any scheduled reconciliation.
    pub fn clear(&self) {
        self.cancel_reconcile();
        let mut state = self.state.write().unwrap();
        state.generation += 1;
        state.chat_id = None;
        state.messages.clear();
        state.cursor.reset();
        state.loading = false;
        drop(state);
        self.selection.select(None);
    }

    /// Schedule the delayed post-send reconciliation fetch, replacing (and
    /// aborting) any previous one.
    fn schedule_reconcile(self: &Arc<Self>, chat_id: &ChatId) {
        let delay = self.tuning.send_reconcile_delay();
        let weak = Arc::downgrade(self);
        let chat_id = chat_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(store) = weak.upgrade() else { return };
            // Disarm before reloading so load_messages' own cancel does
            // not abort the task that is running it.
            store.reconcile.lock().unwrap().take();
            if store.selection.is_selected(&chat_id) {
                debug!("post-send reconcile fetch for {chat_id}");
                if let Err(e) = store.load_messages(&chat_id).await {
                    debug!("post-send reconcile fetch failed: {e}");
                }
            }
        });

        let mut slot = self.reconcile.lock().unwrap();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn cancel_reconcile(&self) {
        if let Some(handle) = self.reconcile.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for ThreadStore {
    fn drop(&mut self) {
        self.cancel_reconcile();
    }
}
