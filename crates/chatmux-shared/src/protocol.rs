use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::BROADCAST_RECEIVER;
use crate::error::ProtocolError;
use crate::types::{
    Attachment, AttachmentKind, ChatMessage, ConversationDescriptor, Identity, RoomId,
    UploadedFile,
};

/// Full snapshot of the users currently online.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub online: Vec<Identity>,
}

/// A chat message as it travels over the websocket and the history API.
///
/// Every field is optional on the wire and the backend echoes whatever the
/// sending client put in. A field of the wrong JSON type decodes as `None`
/// instead of failing the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFrame {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_size", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<NaiveDateTime>,
}

impl MessageFrame {
    /// Text frame from `sender` addressed to the given conversation.
    pub fn text(sender: &Identity, target: &ConversationDescriptor, content: &str) -> Self {
        let mut frame = Self {
            sender: Some(sender.to_string()),
            content: Some(content.to_string()),
            ..Default::default()
        };
        frame.address(target);
        frame
    }

    /// Attachment frame. The content is always empty.
    pub fn attachment(
        sender: &Identity,
        target: &ConversationDescriptor,
        file: &UploadedFile,
    ) -> Self {
        let mut frame = Self {
            sender: Some(sender.to_string()),
            content: Some(String::new()),
            kind: Some(file.kind().as_wire().to_string()),
            file_url: Some(file.file_url.clone()),
            file_name: Some(file.file_name.clone()),
            file_type: file.file_type.clone(),
            file_size: file.file_size,
            ..Default::default()
        };
        frame.address(target);
        frame
    }

    /// Set exactly one of `roomId` / `receiver` for the target conversation.
    fn address(&mut self, target: &ConversationDescriptor) {
        match target {
            ConversationDescriptor::Room { room_id, .. } => {
                self.room_id = Some(room_id.to_string());
                self.receiver = None;
            }
            ConversationDescriptor::DirectMessage { peer } => {
                self.receiver = Some(peer.to_string());
                self.room_id = None;
            }
            ConversationDescriptor::Broadcast => {
                self.receiver = Some(BROADCAST_RECEIVER.to_string());
                self.room_id = None;
            }
        }
    }

    /// Whether the frame names a room or a receiver.
    pub fn has_routing(&self) -> bool {
        self.has_room() || present(&self.receiver)
    }

    /// A room id alone is enough to route a frame, sender or not.
    pub fn has_room(&self) -> bool {
        present(&self.room_id)
    }

    pub fn has_sender(&self) -> bool {
        present(&self.sender)
    }

    /// Convert into the engine's message model. Fails only if there is no
    /// sender.
    pub fn into_message(self) -> Result<ChatMessage, ProtocolError> {
        if !self.has_sender() {
            return Err(ProtocolError::MissingSender);
        }
        Ok(self.into_message_lossy())
    }

    /// Convert without validation; a missing sender becomes an empty
    /// identity.
    pub fn into_message_lossy(self) -> ChatMessage {
        let sender = self.sender.unwrap_or_default();

        let attachment = self.file_url.map(|url| {
            let kind = self
                .kind
                .as_deref()
                .and_then(AttachmentKind::from_wire)
                .unwrap_or_else(|| {
                    AttachmentKind::from_mime(self.file_type.as_deref().unwrap_or_default())
                });
            Attachment {
                kind,
                url,
                name: self.file_name.unwrap_or_default(),
                mime_type: self.file_type,
                size: self.file_size,
            }
        });

        ChatMessage {
            id: self.id,
            sender: Identity(sender),
            receiver: self.receiver.map(Identity),
            room_id: self.room_id.map(RoomId),
            content: self.content.unwrap_or_default(),
            attachment,
            timestamp: self.timestamp,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Accept ISO local date-times (`2024-05-01T10:20:30.123`) and RFC 3339
/// strings; anything else, including `null`, becomes `None` rather than
/// failing the whole frame.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::String(s)) = value else {
        return Ok(None);
    };

    if let Ok(naive) = s.parse::<NaiveDateTime>() {
        return Ok(Some(naive));
    }
    Ok(DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.naive_utc()))
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Strings pass through and numbers are rendered as text. Anything else
/// becomes `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Sizes may arrive as numbers or numeric strings.
fn lenient_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
