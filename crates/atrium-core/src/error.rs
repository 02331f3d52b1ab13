// Error types for the notification pipeline

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors that can occur while recording or dispatching notifications
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Event queue / storage error
    #[error("queue error: {0}")]
    Queue(String),

    /// User directory lookup error
    #[error("directory error: {0}")]
    Directory(String),

    /// Email transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Finalizing or releasing events that the caller does not hold
    #[error("batch not claimed: {0} of {1} events were not in claimed state")]
    BatchNotClaimed(usize, usize),

    /// Recipient does not resolve to a known user
    #[error("unknown recipient: {0}")]
    UnknownRecipient(Uuid),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl NotifyError {
    /// Create a queue error
    pub fn queue(msg: impl Into<String>) -> Self {
        NotifyError::Queue(msg.into())
    }

    /// Create a directory error
    pub fn directory(msg: impl Into<String>) -> Self {
        NotifyError::Directory(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        NotifyError::Transport(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        NotifyError::Serialization(msg.into())
    }
}
