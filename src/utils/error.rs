use thiserror::Error;

pub type Result<T> = std::result::Result<T, P2PError>;

#[derive(Error, Debug)]
pub enum P2PError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Chunk verification failed: {0}")]
    ChunkVerificationFailed(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The remote peer answered with an explicit `error` frame.
    #[error("Peer responded with error: {0}")]
    Declined(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl P2PError {
    /// True for every "missing thing on read" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            P2PError::FileNotFound(_)
                | P2PError::ChunkNotFound(_)
                | P2PError::PeerNotFound(_)
                | P2PError::InvalidFilename(_)
        )
    }
}

impl From<std::io::Error> for P2PError {
    fn from(err: std::io::Error) -> Self {
        P2PError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for P2PError {
    fn from(err: serde_json::Error) -> Self {
        P2PError::ProtocolError(err.to_string())
    }
}
