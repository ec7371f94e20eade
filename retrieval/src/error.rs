//! Error types for the retrieval layer.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur while setting up or driving the facade.
///
/// Query paths degrade to empty results instead of failing; these come from
/// construction and the async plumbing around it.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Contact directory error.
    #[error("identity error: {0}")]
    Identity(#[from] oscar_identity::IdentityError),

    /// Message store error.
    #[error("message error: {0}")]
    Messages(#[from] oscar_messages::MessageError),

    /// Evidence source error.
    #[error("evidence error: {0}")]
    Evidence(#[from] oscar_evidence::EvidenceError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration file is not valid TOML.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
