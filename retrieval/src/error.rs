//! Error types for storage, retrieval and answering.

use http::StatusCode;
use thiserror::Error;

use docrag_embeddings::{EmbeddingError, FailureKind};

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval service.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The request itself is unusable.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Nothing matched the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// The document already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The chunk store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The answer service failed.
    #[error("answer generation failed: {0}")]
    Answer(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    /// Transport status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Embedding(err) if err.kind() == FailureKind::InvalidInput => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Answer(_) => StatusCode::BAD_GATEWAY,
            Self::Embedding(_)
            | Self::Storage(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing detail message.
    ///
    /// Embedding failures are collapsed to one message; their cause is
    /// only logged.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Answer(msg) => msg.clone(),
            Self::Embedding(err) if err.kind() == FailureKind::InvalidInput => err.to_string(),
            Self::Embedding(_) => "Failed to generate embeddings".to_string(),
            other => other.to_string(),
        }
    }
}
