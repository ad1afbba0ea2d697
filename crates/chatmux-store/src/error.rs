use thiserror::Error;

/// Failure of the history-fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or the backend answered with an error.
    #[error("History request failed: {0}")]
    Request(String),

    /// The backend answered with something that is not a message list.
    #[error("Invalid history payload: {0}")]
    Decode(String),
}
