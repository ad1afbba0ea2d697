use serde::Serialize;

use chatmux_shared::{ConnectionState, ConversationKey};

/// Notifications for the UI layer, produced by
/// [`Multiplexer::next_event`](crate::Multiplexer::next_event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    ConnectionChanged {
        state: ConnectionState,
    },
    /// A live message was appended to `key`.
    ConversationUpdated {
        key: ConversationKey,
        active: bool,
    },
    /// The history of `key` settled. `error` is set when the fetch failed
    /// and only live messages are shown.
    HistoryLoaded {
        key: ConversationKey,
        active: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PresenceChanged {
        online: usize,
    },
    TransportError {
        message: String,
    },
}
