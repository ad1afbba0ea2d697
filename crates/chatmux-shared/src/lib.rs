// Data model, wire protocol and conversation key derivation shared by every
// chatmux crate.

pub mod constants;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use keys::{key_for_descriptor, key_for_message, ConversationKey};
pub use protocol::{MessageFrame, PresenceFrame};
pub use types::{
    Attachment, AttachmentKind, ChatMessage, ConnectionState, ConversationDescriptor, Identity,
    Room, RoomId, UploadedFile,
};
