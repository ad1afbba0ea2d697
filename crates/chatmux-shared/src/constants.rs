/// Application name
pub const APP_NAME: &str = "chatmux";

/// Receiver value that addresses every connected user
pub const BROADCAST_RECEIVER: &str = "ALL";

/// Conversation key of the broadcast channel
pub const BROADCAST_KEY: &str = "ALL";

/// Namespace tag for direct-message conversation keys
pub const DM_KEY_TAG: &str = "DM";

/// Namespace tag for room conversation keys
pub const ROOM_KEY_TAG: &str = "ROOM";

/// Separator between the parts of a conversation key
pub const KEY_SEPARATOR: &str = "__";

/// `type` value of a presence snapshot frame
pub const PRESENCE_FRAME_TYPE: &str = "PRESENCE";

/// Websocket endpoint, appended to the path of the websocket base URL
pub const CHAT_ENDPOINT_PATH: &str = "chat";

/// Default backend REST base URL
pub const DEFAULT_API_BASE: &str = "http://localhost:8080";

/// Capacity of the command / notification channels between the engine and
/// the transport task
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for REST collaborator calls in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
