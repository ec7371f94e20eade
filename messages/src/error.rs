//! Error types for message stores.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for message store operations.
pub type Result<T> = std::result::Result<T, MessageError>;

/// Errors that can occur while reading a message store.
#[derive(Error, Debug)]
pub enum MessageError {
    /// The store file does not exist or cannot be opened.
    #[error("message store unavailable: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    /// A record could not be decoded.
    #[error("malformed record at line {line}: {reason}")]
    Decode { line: usize, reason: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
