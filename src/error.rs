//! PromptGuard error types

use thiserror::Error;

/// PromptGuard error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid detection pattern
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// Persistence layer missing or failing
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Expected host element (input box, send button) is absent
    #[error("Collaborator not found: {0}")]
    CollaboratorNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for PromptGuard operations
pub type Result<T> = std::result::Result<T, Error>;
