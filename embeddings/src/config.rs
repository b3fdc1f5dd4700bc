//! Configuration for chunking and embedding.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::validator::MAX_TOKENS_PER_CHUNK;

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Defaults for document processing. Every field can be overridden per call
/// through [`crate::ProcessOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Embedding model; also selects the tokenizer.
    pub model: String,

    /// Target chunk size in tokens.
    pub chunk_size: usize,

    /// Tokens shared by consecutive chunks.
    pub chunk_overlap: usize,

    /// Preferred embedding batch size.
    pub batch_size: usize,

    /// Hard ceiling for a single chunk, in tokens.
    pub max_tokens_per_chunk: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 20,
            max_tokens_per_chunk: MAX_TOKENS_PER_CHUNK,
        }
    }
}

impl ProcessingConfig {
    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set chunk size and overlap.
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Set the preferred batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Transport behaviour of the [`crate::EmbeddingClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingClientConfig {
    /// Model used when a call does not name one.
    pub default_model: String,

    /// Upper bound for a single provider call.
    pub request_timeout: Duration,

    /// Pause between consecutive batches.
    pub batch_delay: Duration,

    /// Batch size used when a call does not name one.
    pub default_batch_size: usize,

    /// Token ceiling applied to every input before it is sent.
    pub max_tokens_per_chunk: usize,

    /// Retry policy for each provider call.
    pub retry: RetryPolicy,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            request_timeout: Duration::from_secs(10),
            batch_delay: Duration::from_millis(100),
            default_batch_size: 5,
            max_tokens_per_chunk: MAX_TOKENS_PER_CHUNK,
            retry: RetryPolicy::default(),
        }
    }
}

impl EmbeddingClientConfig {
    /// Derive client settings from processing defaults. The implicit batch
    /// size is capped at 5 to keep single requests short.
    pub fn from_processing(config: &ProcessingConfig) -> Self {
        Self {
            default_model: config.model.clone(),
            default_batch_size: config.batch_size.clamp(1, 5),
            max_tokens_per_chunk: config.max_tokens_per_chunk,
            ..Self::default()
        }
    }

    /// Set the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the inter-batch delay.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: impl Into<RetryPolicy>) -> Self {
        self.retry = retry.into();
        self
    }
}
