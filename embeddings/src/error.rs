//! Error types for the embeddings pipeline.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Broad failure category used by the retry policy and by callers that map
/// failures onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The service asked us to slow down.
    RateLimit,
    /// The call did not complete within the per-call timeout.
    Timeout,
    /// The service could not be reached.
    Connection,
    /// The service answered with a non-success status.
    Api,
    /// The service answered with something we could not use.
    InvalidResponse,
    /// The caller handed us something unusable.
    InvalidInput,
    /// Missing credentials or similar setup problems.
    Config,
    /// Anything else.
    Other,
}

/// Errors that can occur in the embeddings pipeline.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed with a non-success status.
    #[error("API request failed ({status}): {message}")]
    ApiRequest { status: u16, message: String },

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The call exceeded the per-call timeout.
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The service could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// Caller supplied unusable input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Two vectors that must share a dimension do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Tokenizer could not be loaded or could not decode tokens.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The embedding stage as a whole could not complete.
    #[error("embedding generation failed: {source}")]
    GenerationFailed {
        #[source]
        source: Box<EmbeddingError>,
    },
}

impl EmbeddingError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimit,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Connection(_) => FailureKind::Connection,
            Self::ApiRequest { .. } => FailureKind::Api,
            Self::InvalidResponse(_) | Self::Serialization(_) => FailureKind::InvalidResponse,
            Self::InvalidInput(_) | Self::DimensionMismatch { .. } => FailureKind::InvalidInput,
            Self::ProviderNotConfigured | Self::Tokenizer(_) => FailureKind::Config,
            Self::Http(err) if err.is_timeout() => FailureKind::Timeout,
            Self::Http(err) if err.is_connect() => FailureKind::Connection,
            Self::Http(_) => FailureKind::Other,
            Self::GenerationFailed { source } => source.kind(),
        }
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            Self::GenerationFailed { source } => source.retry_after(),
            _ => None,
        }
    }

    /// Whether this is the dedicated "embedding generation failed" condition.
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Self::GenerationFailed { .. })
    }

    /// Wrap this error as an embedding-stage failure. Already wrapped errors
    /// are returned unchanged.
    pub fn into_generation_failure(self) -> Self {
        match self {
            Self::GenerationFailed { .. } => self,
            other => Self::GenerationFailed {
                source: Box::new(other),
            },
        }
    }
}
