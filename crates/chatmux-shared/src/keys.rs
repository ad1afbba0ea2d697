//! Canonical conversation keys.
//!
//! Every conversation (broadcast, direct-message pair, room) is addressed by a
//! [`ConversationKey`]. Keys live in disjoint namespaces so that a room id can
//! never collide with a username pair or with the broadcast channel:
//!
//! - broadcast: `ALL`
//! - direct message: `DM__<len>:<first>__<second>` with the two participants
//!   sorted, `<len>` being the byte length of `<first>`
//! - room: `ROOM__<roomId>`

use serde::{Deserialize, Serialize};

use crate::constants::{BROADCAST_KEY, DM_KEY_TAG, KEY_SEPARATOR, ROOM_KEY_TAG};
use crate::types::{ChatMessage, ConversationDescriptor, Identity, RoomId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn broadcast() -> Self {
        Self(BROADCAST_KEY.to_string())
    }

    /// Key of the direct-message thread between `a` and `b`, independent of
    /// argument order.
    pub fn direct(a: &Identity, b: &Identity) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        // The length prefix keeps the split point unambiguous even when a
        // username contains the separator.
        Self(format!(
            "{DM_KEY_TAG}{KEY_SEPARATOR}{}:{}{KEY_SEPARATOR}{}",
            first.as_str().len(),
            first,
            second
        ))
    }

    pub fn room(room_id: &RoomId) -> Self {
        Self(format!("{ROOM_KEY_TAG}{KEY_SEPARATOR}{room_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_KEY
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the key of a conversation selected by `me`.
pub fn key_for_descriptor(descriptor: &ConversationDescriptor, me: &Identity) -> ConversationKey {
    match descriptor {
        ConversationDescriptor::Broadcast => ConversationKey::broadcast(),
        ConversationDescriptor::DirectMessage { peer } => ConversationKey::direct(me, peer),
        ConversationDescriptor::Room { room_id, .. } => ConversationKey::room(room_id),
    }
}

/// Resolve the conversation an inbound message belongs to.
///
/// A non-blank room id wins; otherwise a non-blank receiver other than the
/// broadcast sentinel makes it a direct message between sender and receiver.
/// Anything else, including messages with no routing field at all, lands in
/// the broadcast channel. That fallback matches how the backend itself
/// delivers receiver-less messages.
pub fn key_for_message(message: &ChatMessage) -> ConversationKey {
    if let Some(room_id) = message.room_id.as_ref().filter(|r| !r.as_str().trim().is_empty()) {
        return ConversationKey::room(room_id);
    }

    match message.receiver.as_ref() {
        Some(receiver) if !receiver.as_str().trim().is_empty() && !receiver.is_broadcast_sentinel() => {
            ConversationKey::direct(&message.sender, receiver)
        }
        _ => ConversationKey::broadcast(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    #[test]
    fn test_direct_key_is_symmetric() {
        let pairs = [("alice", "bob"), ("a", "ab"), ("Zed", "zed"), ("x__y", "x"), ("", "q")];
        for (a, b) in pairs {
            assert_eq!(
                ConversationKey::direct(&id(a), &id(b)),
                ConversationKey::direct(&id(b), &id(a)),
                "DM({a},{b})"
            );
        }
    }

    #[test]
    fn test_descriptor_and_message_agree() {
        let me = id("alice");
        let descriptor = ConversationDescriptor::direct("bob");

        let outgoing = ChatMessage::text("alice", "hi").to("bob");
        let incoming = ChatMessage::text("bob", "hey").to("alice");

        let key = key_for_descriptor(&descriptor, &me);
        assert_eq!(key, key_for_message(&outgoing));
        assert_eq!(key, key_for_message(&incoming));
    }

    #[test]
    fn test_separator_in_names_does_not_collide() {
        // Without a length prefix both would join to "DM__a__b__c".
        let k1 = ConversationKey::direct(&id("a"), &id("b__c"));
        let k2 = ConversationKey::direct(&id("a__b"), &id("c"));
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_kinds_never_collide() {
        let me = id("ALL");
        let broadcast = key_for_descriptor(&ConversationDescriptor::Broadcast, &me);
        let dm = key_for_descriptor(&ConversationDescriptor::direct("ALL"), &me);
        let room = key_for_descriptor(&ConversationDescriptor::room("ALL", "ALL"), &me);
        assert_ne!(broadcast, dm);
        assert_ne!(broadcast, room);
        assert_ne!(dm, room);

        // A room whose id mimics a DM key stays in the room namespace.
        let dm_ab = ConversationKey::direct(&id("a"), &id("b"));
        let tricky_room = ConversationKey::room(&RoomId::new(dm_ab.as_str()));
        assert_ne!(dm_ab, tricky_room);
    }

    #[test]
    fn test_room_key_format() {
        let key = key_for_descriptor(&ConversationDescriptor::room("R1", "Java Team"), &id("alice"));
        assert_eq!(key.as_str(), "ROOM__R1");
    }

    #[test]
    fn test_message_routing_rules() {
        let room_msg = ChatMessage::text("alice", "x").in_room("R1").to("bob");
        assert_eq!(key_for_message(&room_msg).as_str(), "ROOM__R1");

        let broadcast_msg = ChatMessage::text("alice", "x").to("ALL");
        assert!(key_for_message(&broadcast_msg).is_broadcast());

        let lower_sentinel = ChatMessage::text("alice", "x").to("all");
        assert!(key_for_message(&lower_sentinel).is_broadcast());
    }

    #[test]
    fn test_unroutable_message_falls_back_to_broadcast() {
        let bare = ChatMessage::text("alice", "x");
        assert!(key_for_message(&bare).is_broadcast());

        let blank = ChatMessage::text("alice", "x").in_room("  ").to("");
        assert!(key_for_message(&blank).is_broadcast());
    }
}
