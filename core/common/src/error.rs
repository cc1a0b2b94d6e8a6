//! Common error types for Lantern.

use thiserror::Error;

/// Top-level error type for Lantern operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure reaching the network (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// Local store transaction failed (quota, I/O, corruption).
    #[error("Storage error: {0}")]
    Storage(String),

    /// A fetch completed but with a status the caller cannot accept.
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The remote sync endpoint answered with a non-success status.
    #[error("Sync rejected by remote with status {status}")]
    SyncRejected { status: u16 },

    /// The remote accepted a batch but the local queue could not be cleared.
    #[error("Sync accepted remotely but not committed locally: {0}")]
    SyncUncommitted(String),

    /// Deferred-trigger facility is not available on this platform.
    #[error("Platform facility unsupported: {0}")]
    PlatformUnsupported(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from the transport rather than the remote.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// Whether this error is a sync failure in the sense of the retry contract:
    /// the queue was left intact and a later trigger may try again.
    pub fn is_sync_failure(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::SyncRejected { .. } | Error::SyncUncommitted(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
