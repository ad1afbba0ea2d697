use thiserror::Error;

use chatmux_shared::{ConnectionState, ProtocolError};

#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A send was attempted while the session is not open. Nothing was
    /// transmitted or queued.
    #[error("Not connected (connection is {state:?})")]
    NotConnected { state: ConnectionState },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
