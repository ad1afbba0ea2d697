//! The per-session conversation cache.
//!
//! [`HistoryStore`] is the only owner of conversation state. Callers read
//! through it and mutate it only through its operations:
//!
//! - [`HistoryStore::append_live`] for messages routed from the connection,
//! - [`HistoryStore::ensure_loaded`] / [`HistoryStore::complete_load`] for the
//!   one-time history fetch,
//! - [`HistoryStore::drop`] when the user deleted a conversation.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use chatmux_shared::{ChatMessage, ConversationKey};

use crate::error::FetchError;
use crate::merge::merge_history;
use crate::models::{Conversation, FetchTicket, LoadState};

#[derive(Debug, Default)]
pub struct HistoryStore {
    conversations: HashMap<ConversationKey, Conversation>,
    next_generation: u64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get(&self, key: &ConversationKey) -> Option<&Conversation> {
        self.conversations.get(key)
    }

    /// Messages of a conversation, empty if nothing is cached for it.
    pub fn messages(&self, key: &ConversationKey) -> &[ChatMessage] {
        self.conversations
            .get(key)
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn state(&self, key: &ConversationKey) -> LoadState {
        self.conversations
            .get(key)
            .map(|c| c.state)
            .unwrap_or(LoadState::Unloaded)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Make sure the history of `key` is fetched, at most once per session.
    ///
    /// If the conversation is unloaded, it moves to `Loading` and `fetch` is
    /// called with a ticket that must later be passed to
    /// [`complete_load`](Self::complete_load). If a fetch is already in
    /// flight or done, `fetch` is not called. Either way the current cache is
    /// returned.
    pub fn ensure_loaded<F>(&mut self, key: &ConversationKey, fetch: F) -> &Conversation
    where
        F: FnOnce(FetchTicket),
    {
        let conversation = self
            .conversations
            .entry(key.clone())
            .or_insert_with(|| Conversation::new(key.clone()));

        if conversation.state == LoadState::Unloaded {
            self.next_generation += 1;
            let generation = self.next_generation;
            conversation.state = LoadState::Loading { generation };

            debug!(key = %key, generation, "Issuing history fetch");
            fetch(FetchTicket {
                key: key.clone(),
                generation,
            });
        }

        &self.conversations[key]
    }

    /// Apply the result of a history fetch to the conversation that issued it.
    ///
    /// Returns `false` if the ticket is stale (the conversation was dropped,
    /// invalidated or the store cleared since the fetch was issued), in which
    /// case nothing changes.
    pub fn complete_load(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<ChatMessage>, FetchError>,
    ) -> bool {
        let Some(conversation) = self.conversations.get_mut(&ticket.key) else {
            debug!(key = %ticket.key, "Discarding history for dropped conversation");
            return false;
        };

        if conversation.state != (LoadState::Loading { generation: ticket.generation }) {
            debug!(
                key = %ticket.key,
                generation = ticket.generation,
                state = ?conversation.state,
                "Discarding stale history fetch"
            );
            return false;
        }

        match result {
            Ok(fetched) => {
                let local = std::mem::take(&mut conversation.messages);
                let merged = merge_history(fetched, local);
                info!(
                    key = %ticket.key,
                    total = merged.messages.len(),
                    live_appended = merged.appended,
                    duplicates = merged.duplicates,
                    "History merged"
                );
                conversation.messages = merged.messages;
            }
            Err(e) => {
                // Settle as loaded so the conversation is not stuck loading;
                // live messages already held stay.
                warn!(key = %ticket.key, error = %e, "History fetch failed");
            }
        }

        conversation.state = LoadState::Loaded;
        true
    }

    // ------------------------------------------------------------------
    // Live
    // ------------------------------------------------------------------

    /// Append a live message to the tail of its conversation, creating the
    /// conversation if needed. Never blocks and never waits for history.
    pub fn append_live(&mut self, key: ConversationKey, message: ChatMessage) {
        let conversation = self
            .conversations
            .entry(key.clone())
            .or_insert_with(|| Conversation::new(key));
        conversation.messages.push(message);
    }

    // ------------------------------------------------------------------
    // Delete / reset
    // ------------------------------------------------------------------

    /// Remove a conversation from the cache. The next
    /// [`ensure_loaded`](Self::ensure_loaded) fetches it again. Returns `true`
    /// if an entry was removed.
    pub fn drop(&mut self, key: &ConversationKey) -> bool {
        let removed = self.conversations.remove(key).is_some();
        if removed {
            debug!(key = %key, "Dropped conversation from cache");
        }
        removed
    }

    /// Mark a conversation for refetch on the next `ensure_loaded`, keeping
    /// the messages it holds. Used to retry after a failed fetch.
    pub fn invalidate(&mut self, key: &ConversationKey) {
        if let Some(conversation) = self.conversations.get_mut(key) {
            conversation.state = LoadState::Unloaded;
        }
    }

    /// Forget every conversation. Called when the session ends.
    pub fn clear(&mut self) {
        self.conversations.clear();
    }
}
