//! Error types for contact directories.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors raised while loading contact directories.
///
/// None of these escape an index query: a directory that fails to load is
/// logged and skipped.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The directory file or root does not exist or cannot be opened.
    #[error("directory source unavailable: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk failed.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}
