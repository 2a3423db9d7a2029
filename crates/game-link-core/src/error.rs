//! Error types for game-link

use thiserror::Error;

/// Result type for game-link operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// game-link error types
///
/// Contract violations (running a task on the wrong thread, nested calls on
/// one `Downlink`) are not represented here; they panic.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The owner of the addressed object has been torn down; the request was
    /// discarded without running
    #[error("Request target unavailable")]
    Unavailable,

    /// A dispatcher or event loop is no longer accepting work
    #[error("Dispatcher disconnected: {0}")]
    Disconnected(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Worker thread could not be started or joined
    #[error("Thread error: {0}")]
    Thread(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Config(err.to_string())
    }
}
