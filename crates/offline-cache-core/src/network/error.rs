use thiserror::Error;

/// Transport-level failures. An HTTP error status is not a `NetworkError`;
/// it arrives as a regular [`Response`](crate::Response).
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

impl NetworkError {
    /// Whether the request never got an answer from the network. Only these
    /// failures fall back to the cache; anything else is a malformed request.
    pub fn is_transport(&self) -> bool {
        match self {
            NetworkError::Transport(e) => !e.is_builder(),
            NetworkError::Unreachable(_) => true,
            NetworkError::InvalidHeader { .. } => false,
        }
    }
}
