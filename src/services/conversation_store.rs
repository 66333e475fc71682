//! Conversation list store
//!
//! In-memory cache of conversation summaries: pagination, silent
//! rate-limited refresh, and optimistic flag mutations verified against
//! the gateway. Between refreshes the list is the UI's source of truth.
//!
//! Lock discipline: the state lock is only held for synchronous sections.
//! Every gateway call runs with no guard held, so operations overlap and
//! the state captured before an await may be stale by the time it resumes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::SyncTuning;
use crate::gateway::RemoteGateway;
use crate::services::selection::ActiveChat;
use crate::types::{
    ChatError, ChatId, ConversationPatch, ConversationSummary, EventSink, Message, PageCursor,
    Preview, Result, StoreEvent,
};

/// Boolean conversation flags with an optimistic-flip-then-verify cycle.
#[derive(Clone, Copy)]
enum Flag {
    Pinned,
    Muted,
}

#[derive(Debug)]
struct ListState {
    items: Vec<ConversationSummary>,
    cursor: PageCursor,
    loading: bool,
}

/// Conversation-list cache backed by a [`RemoteGateway`].
pub struct ConversationStore {
    gateway: Arc<dyn RemoteGateway>,
    selection: Arc<ActiveChat>,
    events: EventSink,
    tuning: SyncTuning,
    state: RwLock<ListState>,
    /// Reentrancy guard for `refresh`; a refresh already in flight makes
    /// the next call a silent no-op.
    refreshing: AtomicBool,
    /// Completion time of the last *successful* refresh.
    last_refresh: Mutex<Option<Instant>>,
}

impl ConversationStore {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        selection: Arc<ActiveChat>,
        events: EventSink,
        tuning: SyncTuning,
    ) -> Self {
        let cursor = PageCursor::new(tuning.conversation_page_size);
        Self {
            gateway,
            selection,
            events,
            tuning,
            state: RwLock::new(ListState {
                items: Vec::new(),
                cursor,
                loading: false,
            }),
            refreshing: AtomicBool::new(false),
            last_refresh: Mutex::new(None),
        }
    }

    /// Snapshot of the current list in display order.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.read().unwrap().items.clone()
    }

    /// Find one summary by chat id.
    pub fn conversation(&self, chat_id: &ChatId) -> Option<ConversationSummary> {
        self.state
            .read()
            .unwrap()
            .items
            .iter()
            .find(|c| &c.id == chat_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_more(&self) -> bool {
        self.state.read().unwrap().cursor.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().unwrap().loading
    }

    /// Load the first page of conversations.
    ///
    /// With `reset` the list is replaced outright. Without it the fresh
    /// page is merged ahead of any deeper rows already held, so a reload
    /// does not throw away pagination the user has already scrolled.
    pub async fn fetch(&self, reset: bool) -> Result<()> {
        let limit = {
            let mut state = self.state.write().unwrap();
            if state.loading {
                debug!("fetch skipped: load already in flight");
                return Ok(());
            }
            state.loading = true;
            state.cursor.limit
        };

        let result = self.gateway.fetch_conversations(0, limit).await;

        let mut state = self.state.write().unwrap();
        state.loading = false;
        let page = result?;
        debug!("fetched {} conversations (reset={reset})", page.len());

        state.cursor.reset();
        state.cursor.advance(page.len());

        if reset {
            state.items = page;
        } else {
            let mut merged = page;
            let holdover: Vec<ConversationSummary> = state
                .items
                .drain(..)
                .filter(|held| merged.iter().all(|fresh| fresh.id != held.id))
                .collect();
            merged.extend(holdover);
            state.items = merged;
        }
        drop(state);

        self.events.emit(StoreEvent::ConversationsChanged);
        Ok(())
    }

    /// Append the next page. No-op while a load is in flight or once the
    /// list is exhausted.
    pub async fn load_more(&self) -> Result<()> {
        let (offset, limit) = {
            let mut state = self.state.write().unwrap();
            if state.loading || !state.cursor.has_more {
                debug!("load_more skipped (loading or exhausted)");
                return Ok(());
            }
            state.loading = true;
            (state.cursor.offset, state.cursor.limit)
        };

        let result = self.gateway.fetch_conversations(offset, limit).await;

        let mut state = self.state.write().unwrap();
        state.loading = false;
        let page = result?;
        state.cursor.advance(page.len());

        // A row can repeat across page boundaries when the server list
        // shifted between calls; keep the copy we already have.
        for summary in page {
            if state.items.iter().all(|held| held.id != summary.id) {
                state.items.push(summary);
            }
        }
        drop(state);

        self.events.emit(StoreEvent::ConversationsChanged);
        Ok(())
    }

    /// Silent background reload of the freshest window.
    ///
    /// Guarded twice: a refresh already in flight and a refresh inside the
    /// minimum interval are both silent no-ops, never queued. Merge keeps
    /// fresh-window rows in server order followed by held rows outside the
    /// window, so deep pagination survives without re-fetching.
    pub async fn refresh(&self) -> Result<()> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            debug!("refresh skipped: already in flight");
            return Ok(());
        }

        let rate_limited = self
            .last_refresh
            .lock()
            .unwrap()
            .map(|last| last.elapsed() < self.tuning.refresh_min_interval())
            .unwrap_or(false);
        if rate_limited {
            self.refreshing.store(false, Ordering::SeqCst);
            debug!("refresh skipped: within min interval");
            return Ok(());
        }

        let result = self
            .gateway
            .refresh_conversations(self.tuning.refresh_window)
            .await;

        let fresh = match result {
            Ok(fresh) => fresh,
            Err(e) => {
                self.refreshing.store(false, Ordering::SeqCst);
                debug!("silent refresh failed: {e}");
                return Err(e);
            }
        };

        {
            let mut state = self.state.write().unwrap();
            let selected = self.selection.get();

            let mut merged = fresh;
            for summary in merged.iter_mut() {
                // The chat the user is looking at is never shown unread,
                // even when a read receipt races the fresh data.
                if summary.unread && selected.as_ref() == Some(&summary.id) {
                    summary.unread = false;
                }
            }

            let holdover: Vec<ConversationSummary> = state
                .items
                .drain(..)
                .filter(|held| merged.iter().all(|fresh| fresh.id != held.id))
                .collect();
            merged.extend(holdover);
            state.items = merged;
        }

        *self.last_refresh.lock().unwrap() = Some(Instant::now());
        self.refreshing.store(false, Ordering::SeqCst);

        self.events.emit(StoreEvent::ConversationsChanged);
        Ok(())
    }

    /// Set a conversation's preview from `message` and move it to the
    /// head of the list.
    ///
    /// Synchronous on purpose: the thread store calls this in the same
    /// logical step as its own mutation, with no await in between, so the
    /// two caches cannot present contradictory latest-message views.
    /// An unknown chat id is a no-op; the next refresh materializes it.
    pub fn update_preview(&self, chat_id: &ChatId, message: &Message) {
        let mut state = self.state.write().unwrap();
        let Some(pos) = state.items.iter().position(|c| &c.id == chat_id) else {
            debug!("preview update for unknown chat {chat_id}, ignoring");
            return;
        };

        let mut summary = state.items.remove(pos);
        summary.preview = Some(Preview::from_message(message));
        if !message.is_from_me && !self.selection.is_selected(chat_id) {
            summary.unread = true;
        }
        state.items.insert(0, summary);
        drop(state);

        self.events.emit(StoreEvent::ConversationUpdated {
            chat_id: chat_id.clone(),
        });
    }

    /// Mark a chat read locally, then verify with the server.
    ///
    /// A failed verify is logged and kept: read-state divergence is low
    /// severity and the next refresh settles it.
    pub async fn mark_read(&self, chat_id: &ChatId) -> Result<()> {
        self.set_unread(chat_id, false)?;
        if let Err(e) = self.gateway.mark_read(chat_id).await {
            warn!("mark_read verify failed for {chat_id}: {e}");
            self.events.emit(StoreEvent::FlagVerifyFailed {
                chat_id: chat_id.clone(),
                error: e.to_string(),
            });
        }
        Ok(())
    }

    /// Mark a chat unread locally, then verify with the server.
    pub async fn mark_unread(&self, chat_id: &ChatId) -> Result<()> {
        self.set_unread(chat_id, true)?;
        if let Err(e) = self.gateway.mark_unread(chat_id).await {
            warn!("mark_unread verify failed for {chat_id}: {e}");
            self.events.emit(StoreEvent::FlagVerifyFailed {
                chat_id: chat_id.clone(),
                error: e.to_string(),
            });
        }
        Ok(())
    }

    /// Toggle the pinned flag. Returns the new value.
    ///
    /// The flip is optimistic; a failed remote update reverts to the value
    /// captured before the flip, unless a newer toggle got there first.
    pub async fn toggle_pin(&self, chat_id: &ChatId) -> Result<bool> {
        let previous = self.flip(chat_id, Flag::Pinned)?;
        let target = !previous;
        if let Err(e) = self
            .gateway
            .update_conversation(chat_id, &ConversationPatch::pin(target))
            .await
        {
            warn!("pin update failed for {chat_id}, reverting: {e}");
            self.revert(chat_id, Flag::Pinned, previous, target);
            return Err(e);
        }
        debug!("chat {chat_id} pinned={target}");
        Ok(target)
    }

    /// Toggle the muted flag. Returns the new value.
    pub async fn toggle_mute(&self, chat_id: &ChatId) -> Result<bool> {
        let previous = self.flip(chat_id, Flag::Muted)?;
        let target = !previous;
        if let Err(e) = self
            .gateway
            .update_conversation(chat_id, &ConversationPatch::mute(target))
            .await
        {
            warn!("mute update failed for {chat_id}, reverting: {e}");
            self.revert(chat_id, Flag::Muted, previous, target);
            return Err(e);
        }
        debug!("chat {chat_id} muted={target}");
        Ok(target)
    }

    /// Archive (remove from the list) or un-archive a chat.
    ///
    /// The local step is optimistic. A failed remote update is *not*
    /// reverted, because removal is not safely reversible from partial
    /// local state; the store resynchronizes with a full reset fetch and
    /// still reports the failure.
    pub async fn archive_chat(&self, chat_id: &ChatId, archived: bool) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            if archived {
                state.items.retain(|c| &c.id != chat_id);
            } else if let Some(summary) = state.items.iter_mut().find(|c| &c.id == chat_id) {
                summary.archived = false;
            }
            // A summary the list no longer holds still gets the remote
            // update; the next refresh materializes the result.
        }
        self.events.emit(StoreEvent::ConversationsChanged);

        if let Err(e) = self
            .gateway
            .update_conversation(chat_id, &ConversationPatch::archive(archived))
            .await
        {
            warn!("archive update failed for {chat_id}, resyncing: {e}");
            if let Err(fetch_err) = self.fetch(true).await {
                warn!("resync after failed archive also failed: {fetch_err}");
            }
            return Err(e);
        }
        debug!("chat {chat_id} archived={archived}");
        Ok(())
    }

    fn set_unread(&self, chat_id: &ChatId, unread: bool) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let summary = state
            .items
            .iter_mut()
            .find(|c| &c.id == chat_id)
            .ok_or_else(|| ChatError::ChatNotFound(chat_id.to_string()))?;
        summary.unread = unread;
        drop(state);

        self.events.emit(StoreEvent::ConversationUpdated {
            chat_id: chat_id.clone(),
        });
        Ok(())
    }

    /// Flip `flag` and return the pre-mutation value.
    fn flip(&self, chat_id: &ChatId, flag: Flag) -> Result<bool> {
        let mut state = self.state.write().unwrap();
        let summary = state
            .items
            .iter_mut()
            .find(|c| &c.id == chat_id)
            .ok_or_else(|| ChatError::ChatNotFound(chat_id.to_string()))?;
        let slot = match flag {
            Flag::Pinned => &mut summary.pinned,
            Flag::Muted => &mut summary.muted,
        };
        let previous = *slot;
        *slot = !previous;
        drop(state);

        self.events.emit(StoreEvent::ConversationUpdated {
            chat_id: chat_id.clone(),
        });
        Ok(previous)
    }

    /// Restore `previous` after a failed verify, but only while the flag
    /// still holds the optimistic value; a toggle that completed in the
    /// meantime must not be clobbered by an older failure.
    fn revert(&self, chat_id: &ChatId, flag: Flag, previous: bool, expected: bool) {
        let mut state = self.state.write().unwrap();
        let Some(summary) = state.items.iter_mut().find(|c| &c.id == chat_id) else {
            return;
        };
        let slot = match flag {
            Flag::Pinned => &mut summary.pinned,
            Flag::Muted => &mut summary.muted,
        };
        if *slot == expected {
            *slot = previous;
            drop(state);
            self.events.emit(StoreEvent::ConversationUpdated {
                chat_id: chat_id.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Scripted gateway: serves fixed pages and counts calls.
    struct ScriptedGateway {
        pages: Mutex<HashMap<usize, Vec<ConversationSummary>>>,
        window: Mutex<Vec<ConversationSummary>>,
        fetch_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        updates: Mutex<Vec<(ChatId, ConversationPatch)>>,
        fail_updates: AtomicBool,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                pages: Mutex::new(HashMap::new()),
                window: Mutex::new(Vec::new()),
                fetch_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                updates: Mutex::new(Vec::new()),
                fail_updates: AtomicBool::new(false),
            }
        }

        fn set_page(&self, offset: usize, page: Vec<ConversationSummary>) {
            self.pages.lock().unwrap().insert(offset, page);
        }

        fn set_window(&self, window: Vec<ConversationSummary>) {
            *self.window.lock().unwrap() = window;
        }
    }

    #[async_trait]
    impl RemoteGateway for ScriptedGateway {
        async fn fetch_conversations(
            &self,
            offset: usize,
            _limit: usize,
        ) -> Result<Vec<ConversationSummary>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .pages
                .lock()
                .unwrap()
                .get(&offset)
                .cloned()
                .unwrap_or_default())
        }

        async fn refresh_conversations(&self, _window: usize) -> Result<Vec<ConversationSummary>> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.window.lock().unwrap().clone())
        }

        async fn fetch_messages(
            &self,
            _chat_id: &ChatId,
            _offset: Option<usize>,
            _limit: usize,
        ) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn send_message(
            &self,
            _chat_id: &ChatId,
            _text: &str,
            _effect: Option<&str>,
        ) -> Result<Message> {
            Err(ChatError::Network("not scripted".into()))
        }

        async fn mark_read(&self, _chat_id: &ChatId) -> Result<()> {
            Ok(())
        }

        async fn mark_unread(&self, _chat_id: &ChatId) -> Result<()> {
            Ok(())
        }

        async fn update_conversation(
            &self,
            chat_id: &ChatId,
            patch: &ConversationPatch,
        ) -> Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(ChatError::Network("update refused".into()));
            }
            self.updates
                .lock()
                .unwrap()
                .push((chat_id.clone(), patch.clone()));
            Ok(())
        }
    }

    fn summary(id: &str) -> ConversationSummary {
        ConversationSummary {
            id: ChatId::new(id),
            participants: vec!["+15550100".into()],
            display_name: None,
            preview: None,
            unread: false,
            pinned: false,
            muted: false,
            archived: false,
        }
    }

    fn store_with(gateway: Arc<ScriptedGateway>) -> (ConversationStore, Arc<ActiveChat>) {
        let selection = Arc::new(ActiveChat::new());
        let (events, _rx) = EventSink::channel();
        let mut tuning = SyncTuning::default();
        tuning.conversation_page_size = 3;
        tuning.refresh_min_interval_ms = 60_000;
        let store = ConversationStore::new(gateway, selection.clone(), events, tuning);
        (store, selection)
    }

    #[tokio::test]
    async fn test_fetch_and_pagination_latch() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_page(0, vec![summary("a"), summary("b"), summary("c")]);
        gateway.set_page(3, vec![summary("d")]);
        let (store, _) = store_with(gateway.clone());

        store.fetch(true).await.unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.has_more());

        // Short page latches has_more off
        store.load_more().await.unwrap();
        assert_eq!(store.len(), 4);
        assert!(!store.has_more());

        // Exhausted list: no further network call
        let calls = gateway.fetch_calls.load(Ordering::SeqCst);
        store.load_more().await.unwrap();
        assert_eq!(gateway.fetch_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_refresh_rate_limit_single_call() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_window(vec![summary("a")]);
        let (store, _) = store_with(gateway.clone());

        store.refresh().await.unwrap();
        store.refresh().await.unwrap();
        assert_eq!(gateway.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_merge_keeps_deep_rows() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_page(0, vec![summary("a"), summary("b"), summary("c")]);
        gateway.set_page(3, vec![summary("d"), summary("e")]);
        let (store, _) = store_with(gateway.clone());
        store.fetch(true).await.unwrap();
        store.load_more().await.unwrap();
        assert_eq!(store.len(), 5);

        // Fresh window reorders the head and drops "c"; deep rows survive.
        gateway.set_window(vec![summary("b"), summary("a")]);
        store.refresh().await.unwrap();

        let ids: Vec<String> = store
            .conversations()
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_refresh_suppresses_unread_on_selected_chat() {
        let gateway = Arc::new(ScriptedGateway::new());
        let mut fresh = summary("x");
        fresh.unread = true;
        gateway.set_window(vec![fresh]);
        let (store, selection) = store_with(gateway);
        selection.select(Some(ChatId::new("x")));

        store.refresh().await.unwrap();
        let chat = store.conversation(&ChatId::new("x")).unwrap();
        assert!(!chat.unread);
    }

    #[tokio::test]
    async fn test_toggle_pin_reverts_on_failure() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_page(0, vec![summary("a")]);
        let (store, _) = store_with(gateway.clone());
        store.fetch(true).await.unwrap();

        gateway.fail_updates.store(true, Ordering::SeqCst);
        let err = store.toggle_pin(&ChatId::new("a")).await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
        assert!(!store.conversation(&ChatId::new("a")).unwrap().pinned);

        gateway.fail_updates.store(false, Ordering::SeqCst);
        assert!(store.toggle_pin(&ChatId::new("a")).await.unwrap());
        assert!(store.conversation(&ChatId::new("a")).unwrap().pinned);

        let updates = gateway.updates.lock().unwrap();
        assert_eq!(
            updates.last(),
            Some(&(ChatId::new("a"), ConversationPatch::pin(true)))
        );
    }

    #[tokio::test]
    async fn test_mark_read_keeps_local_state_on_failure() {
        struct RefusingMarks(ScriptedGateway);

        // Same scripted gateway, but read-state verifies always fail.
        #[async_trait]
        impl RemoteGateway for RefusingMarks {
            async fn fetch_conversations(
                &self,
                offset: usize,
                limit: usize,
            ) -> Result<Vec<ConversationSummary>> {
                self.0.fetch_conversations(offset, limit).await
            }
            async fn refresh_conversations(
                &self,
                window: usize,
            ) -> Result<Vec<ConversationSummary>> {
                self.0.refresh_conversations(window).await
            }
            async fn fetch_messages(
                &self,
                chat_id: &ChatId,
                offset: Option<usize>,
                limit: usize,
            ) -> Result<Vec<Message>> {
                self.0.fetch_messages(chat_id, offset, limit).await
            }
            async fn send_message(
                &self,
                chat_id: &ChatId,
                text: &str,
                effect: Option<&str>,
            ) -> Result<Message> {
                self.0.send_message(chat_id, text, effect).await
            }
            async fn mark_read(&self, _chat_id: &ChatId) -> Result<()> {
                Err(ChatError::Network("no".into()))
            }
            async fn mark_unread(&self, _chat_id: &ChatId) -> Result<()> {
                Err(ChatError::Network("no".into()))
            }
            async fn update_conversation(
                &self,
                chat_id: &ChatId,
                patch: &ConversationPatch,
            ) -> Result<()> {
                self.0.update_conversation(chat_id, patch).await
            }
        }

        let inner = ScriptedGateway::new();
        inner.set_page(0, {
            let mut chat = summary("a");
            chat.unread = true;
            vec![chat]
        });
        let selection = Arc::new(ActiveChat::new());
        let (events, _rx) = EventSink::channel();
        let store = ConversationStore::new(
            Arc::new(RefusingMarks(inner)),
            selection,
            events,
            SyncTuning::default(),
        );
        store.fetch(true).await.unwrap();

        // Verify failure does not revert the optimistic flip.
        store.mark_read(&ChatId::new("a")).await.unwrap();
        assert!(!store.conversation(&ChatId::new("a")).unwrap().unread);
    }

    #[tokio::test]
    async fn test_archive_failure_triggers_resync() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_page(0, vec![summary("a"), summary("b")]);
        let (store, _) = store_with(gateway.clone());
        store.fetch(true).await.unwrap();

        gateway.fail_updates.store(true, Ordering::SeqCst);
        let calls_before = gateway.fetch_calls.load(Ordering::SeqCst);
        let err = store.archive_chat(&ChatId::new("a"), true).await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));

        // No local revert; a reset fetch resynchronized instead.
        assert_eq!(gateway.fetch_calls.load(Ordering::SeqCst), calls_before + 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_preview_moves_to_head_and_flags_unread() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_page(0, vec![summary("a"), summary("b"), summary("c")]);
        let (store, selection) = store_with(gateway);
        store.fetch(true).await.unwrap();
        selection.select(Some(ChatId::new("a")));

        let mut incoming = Message::outgoing(1, ChatId::new("c"), "ping", None);
        incoming.is_from_me = false;
        incoming.sender = Some("+15550100".into());
        store.update_preview(&ChatId::new("c"), &incoming);

        let list = store.conversations();
        assert_eq!(list[0].id, ChatId::new("c"));
        assert!(list[0].unread);
        assert_eq!(list[0].preview.as_ref().unwrap().text, "ping");

        // Unknown chat id: silent no-op
        store.update_preview(&ChatId::new("nope"), &incoming);
        assert_eq!(store.len(), 3);
    }
}
