//! Reconciliation of fetched history with live arrivals.

use chatmux_shared::ChatMessage;

/// Outcome of [`merge_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub messages: Vec<ChatMessage>,
    /// Local messages that were already present in the fetched history.
    pub duplicates: usize,
    /// Local messages appended after the fetched history.
    pub appended: usize,
}

/// Merge a fetched history with the messages already held locally.
///
/// The fetched sequence is the authoritative prefix. Each local message is
/// matched against a not-yet-claimed fetched message with
/// [`ChatMessage::same_message`]; unmatched local messages are appended in
/// their arrival order. Matching is one-to-one, so two genuinely identical
/// messages survive as two entries as long as both sides hold both.
pub fn merge_history(fetched: Vec<ChatMessage>, local: Vec<ChatMessage>) -> Merged {
    let mut claimed = vec![false; fetched.len()];
    let mut tail = Vec::new();

    for message in local {
        let hit = fetched
            .iter()
            .enumerate()
            .position(|(i, f)| !claimed[i] && f.same_message(&message));
        match hit {
            Some(i) => claimed[i] = true,
            None => tail.push(message),
        }
    }

    let duplicates = claimed.iter().filter(|c| **c).count();
    let appended = tail.len();

    let mut messages = fetched;
    messages.extend(tail);

    Merged {
        messages,
        duplicates,
        appended,
    }
}
