//! Error types for evidence sources.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for evidence operations.
pub type Result<T> = std::result::Result<T, EvidenceError>;

/// Errors raised by record sources.
///
/// Collectors log these and report no evidence; they never reach a resolver
/// caller.
#[derive(Error, Debug)]
pub enum EvidenceError {
    /// The export file does not exist or cannot be opened.
    #[error("evidence source unavailable: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    /// The term could not be turned into a pattern.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Message store error.
    #[error("message store error: {0}")]
    Messages(#[from] oscar_messages::MessageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
