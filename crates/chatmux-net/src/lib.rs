// Single-connection transport layer: one websocket session per identity,
// inbound frame classification and presence tracking.

pub mod connection;
pub mod error;
pub mod frames;
pub mod presence;
pub mod transport;

pub use connection::{
    ConnectionCommand, ConnectionEvent, ConnectionManager, ConnectionNotification, Connector,
    Dispatched, SessionId,
};
pub use error::ConnectionError;
pub use frames::{classify_frame, InboundFrame};
pub use presence::PresenceTracker;
pub use transport::{session_url, WsConnector};
