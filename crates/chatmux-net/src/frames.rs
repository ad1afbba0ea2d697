use serde::Deserialize;

use chatmux_shared::constants::PRESENCE_FRAME_TYPE;
use chatmux_shared::{ChatMessage, Identity, MessageFrame, PresenceFrame, ProtocolError};

/// An inbound websocket frame after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Full snapshot of online users.
    Presence(Vec<Identity>),
    /// A message naming a room, or one with a sender and a receiver.
    Message(ChatMessage),
    /// A message-shaped frame that cannot be placed: no room and no sender,
    /// or no routing field at all. Routed to the broadcast channel.
    Malformed(ChatMessage),
}

/// Decode a text frame into an [`InboundFrame`].
///
/// Fails only when the text is not a JSON object, or a presence frame whose
/// `online` list cannot be decoded.
pub fn classify_frame(text: &str) -> Result<InboundFrame, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(ProtocolError::NotAnObject);
    }

    if value.get("type").and_then(|t| t.as_str()) == Some(PRESENCE_FRAME_TYPE) {
        let presence = PresenceFrame::deserialize(value)?;
        return Ok(InboundFrame::Presence(presence.online));
    }

    let frame = MessageFrame::deserialize(value)?;
    if frame.has_room() || (frame.has_sender() && frame.has_routing()) {
        Ok(InboundFrame::Message(frame.into_message_lossy()))
    } else {
        Ok(InboundFrame::Malformed(frame.into_message_lossy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_frame() {
        let frame = classify_frame(r#"{"type":"PRESENCE","online":["alice","bob"]}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Presence(vec![Identity::new("alice"), Identity::new("bob")])
        );
    }

    #[test]
    fn test_presence_without_list_is_empty() {
        let frame = classify_frame(r#"{"type":"PRESENCE"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Presence(Vec::new()));
    }

    #[test]
    fn test_routed_message() {
        let frame = classify_frame(r#"{"sender":"alice","receiver":"bob","content":"hi"}"#).unwrap();
        match frame {
            InboundFrame::Message(m) => {
                assert_eq!(m.sender, Identity::new("alice"));
                assert_eq!(m.content, "hi");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_attachment_type_is_not_presence() {
        let frame = classify_frame(
            r#"{"type":"IMAGE","sender":"a","roomId":"R1","content":"","fileUrl":"u"}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Message(_)));
    }

    #[test]
    fn test_missing_routing_is_malformed() {
        let frame = classify_frame(r#"{"sender":"alice","content":"lost"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Malformed(m) if m.content == "lost"));

        let frame = classify_frame(r#"{"receiver":"bob","content":"who"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Malformed(_)));
    }

    #[test]
    fn test_room_frame_without_sender_is_routed() {
        let frame = classify_frame(r#"{"roomId":"R1","content":"x"}"#).unwrap();
        match frame {
            InboundFrame::Message(m) => {
                assert_eq!(m.room_id.as_ref().map(|r| r.as_str()), Some("R1"));
                assert_eq!(m.sender.as_str(), "");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_size_keeps_message() {
        let frame = classify_frame(
            r#"{"type":"FILE","sender":"a","receiver":"b","content":"","fileUrl":"u","fileSize":"12"}"#,
        )
        .unwrap();
        match frame {
            InboundFrame::Message(m) => {
                assert_eq!(m.attachment.and_then(|a| a.size), Some(12));
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let frame = classify_frame(r#"{"sender":"a","receiver":"b","fileUrl":"u","fileSize":[1]}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Message(m) if m.attachment.is_some()));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(matches!(classify_frame("[1,2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(classify_frame("not json"), Err(ProtocolError::Json(_))));
    }
}
