//! Conversation cache entries.
//!
//! Every struct derives `Serialize` so it can be handed directly to a UI
//! layer.

use serde::Serialize;

use chatmux_shared::{ChatMessage, ConversationKey};

// ---------------------------------------------------------------------------
// Load state
// ---------------------------------------------------------------------------

/// Progress of the one-time history fetch of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    /// No fetch issued yet. Live messages may already be present.
    Unloaded,
    /// A fetch is in flight. `generation` identifies the ticket that may
    /// complete it.
    Loading { generation: u64 },
    /// History merged (or the fetch failed and the conversation was settled
    /// with what it had).
    Loaded,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One conversation bucket: messages in display order plus load progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub key: ConversationKey,
    pub messages: Vec<ChatMessage>,
    pub state: LoadState,
}

impl Conversation {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            messages: Vec::new(),
            state: LoadState::Unloaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading { .. })
    }
}

// ---------------------------------------------------------------------------
// Fetch ticket
// ---------------------------------------------------------------------------

/// Handed to the history-fetch collaborator when a fetch is issued and
/// returned with its result. The ticket binds the merge to the conversation
/// that asked for it, whatever is selected when the fetch resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: ConversationKey,
    pub generation: u64,
}
