use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::BROADCAST_RECEIVER;

// User identity = username, opaque to the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this value is the `ALL` receiver sentinel rather than a user.
    /// The backend compares the sentinel case-insensitively.
    pub fn is_broadcast_sentinel(&self) -> bool {
        self.0.eq_ignore_ascii_case(BROADCAST_RECEIVER)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The conversation a user has selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationDescriptor {
    Broadcast,
    DirectMessage { peer: Identity },
    Room { room_id: RoomId, display_name: String },
}

impl ConversationDescriptor {
    pub fn direct(peer: impl Into<String>) -> Self {
        Self::DirectMessage {
            peer: Identity::new(peer),
        }
    }

    pub fn room(room_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::Room {
            room_id: RoomId::new(room_id),
            display_name: display_name.into(),
        }
    }

    /// Human-readable title for headers and prompts.
    pub fn title(&self) -> &str {
        match self {
            Self::Broadcast => "Broadcast",
            Self::DirectMessage { peer } => peer.as_str(),
            Self::Room { display_name, .. } => display_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

impl AttachmentKind {
    /// Classify an uploaded file by its MIME type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else {
            Self::File
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::File => "FILE",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IMAGE" => Some(Self::Image),
            "VIDEO" => Some(Self::Video),
            "FILE" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
}

/// A chat message as held in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned id, present on echoed and historical messages when the
    /// backend persisted them first.
    pub id: Option<String>,
    pub sender: Identity,
    /// A user, the broadcast sentinel, or `None` for room messages.
    pub receiver: Option<Identity>,
    pub room_id: Option<RoomId>,
    /// Empty for attachment messages.
    pub content: String,
    pub attachment: Option<Attachment>,
    pub timestamp: Option<NaiveDateTime>,
}

impl ChatMessage {
    pub fn text(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender: Identity::new(sender),
            receiver: None,
            room_id: None,
            content: content.into(),
            attachment: None,
            timestamp: None,
        }
    }

    pub fn to(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(Identity::new(receiver));
        self
    }

    pub fn in_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(RoomId::new(room_id));
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether two messages denote the same sent message.
    ///
    /// Server ids decide when both sides carry one. Otherwise sender, content,
    /// timestamp and attachment url must all agree.
    pub fn same_message(&self, other: &ChatMessage) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &other.id) {
            return a == b;
        }
        self.sender == other.sender
            && self.content == other.content
            && self.timestamp == other.timestamp
            && self.attachment.as_ref().map(|a| &a.url) == other.attachment.as_ref().map(|a| &a.url)
    }
}

/// A group room as listed or created by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub members: Vec<Identity>,
}

impl Room {
    pub fn descriptor(&self) -> ConversationDescriptor {
        ConversationDescriptor::Room {
            room_id: self.id.clone(),
            display_name: self.name.clone(),
        }
    }
}

/// Result of the attachment-upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_url: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl UploadedFile {
    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_mime(self.file_type.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_kind_from_mime() {
        assert_eq!(AttachmentKind::from_mime("image/png"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_mime("VIDEO/mp4"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_mime("application/pdf"), AttachmentKind::File);
        assert_eq!(AttachmentKind::from_mime(""), AttachmentKind::File);
    }

    #[test]
    fn test_broadcast_sentinel_is_case_insensitive() {
        assert!(Identity::new("ALL").is_broadcast_sentinel());
        assert!(Identity::new("all").is_broadcast_sentinel());
        assert!(!Identity::new("alice").is_broadcast_sentinel());
    }

    #[test]
    fn test_same_message_prefers_server_id() {
        let a = ChatMessage::text("alice", "hi").with_id("1");
        let b = ChatMessage::text("alice", "hi").with_id("2");
        assert!(!a.same_message(&b));

        let c = ChatMessage::text("alice", "hi");
        assert!(a.same_message(&c));
        assert!(!c.same_message(&ChatMessage::text("bob", "hi")));
    }
}
