use thiserror::Error;

use chatmux_net::ConnectionError;
use chatmux_shared::ConnectionState;
use chatmux_store::FetchError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A send was attempted while the connection is not open.
    #[error("Not connected (connection is {0:?})")]
    SendRejected(ConnectionState),

    #[error("Connection error: {0}")]
    Connection(ConnectionError),

    #[error("History fetch failed: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Room creation failed: {0}")]
    RoomCreationFailed(String),

    #[error("Account deletion failed: {0}")]
    AccountDeletionFailed(String),

    #[error("Broadcast cannot be deleted")]
    BroadcastNotDeletable,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<ConnectionError> for ClientError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::NotConnected { state } => Self::SendRejected(state),
            other => Self::Connection(other),
        }
    }
}
