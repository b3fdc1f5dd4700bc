//! Per-chunk token ceiling enforcement.

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::tokenizer::Encoder;

/// Hard input limit of the OpenAI embedding models.
pub const MAX_TOKENS_PER_CHUNK: usize = 8191;

/// Outcome of checking one chunk against the token ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkCheck {
    /// The chunk fits; use it unchanged.
    WithinLimit,
    /// The chunk was too long; use `text` instead.
    Truncated {
        /// The first `max_tokens` tokens of the chunk, decoded.
        text: String,
        /// Token count of the original chunk.
        original_tokens: usize,
    },
}

impl ChunkCheck {
    /// Whether the chunk can be embedded as is.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::WithinLimit)
    }

    /// Replacement text, present only when the chunk was truncated.
    pub fn truncated_text(&self) -> Option<&str> {
        match self {
            Self::WithinLimit => None,
            Self::Truncated { text, .. } => Some(text),
        }
    }
}

/// Truncates chunks that exceed the embedding service's input limit.
pub struct ChunkValidator {
    encoder: Arc<dyn Encoder>,
    max_tokens: usize,
}

impl ChunkValidator {
    /// Create a validator with the default ceiling.
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self::with_max_tokens(encoder, MAX_TOKENS_PER_CHUNK)
    }

    /// Create a validator with a custom ceiling.
    pub fn with_max_tokens(encoder: Arc<dyn Encoder>, max_tokens: usize) -> Self {
        Self {
            encoder,
            max_tokens,
        }
    }

    /// The token ceiling.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Check one chunk.
    pub fn validate(&self, chunk: &str) -> Result<ChunkCheck> {
        let tokens = self.encoder.encode(chunk);
        if tokens.len() <= self.max_tokens {
            return Ok(ChunkCheck::WithinLimit);
        }

        warn!(
            tokens = tokens.len(),
            max_tokens = self.max_tokens,
            "chunk exceeds token limit, truncating"
        );
        let text = self.encoder.decode(&tokens[..self.max_tokens])?;
        Ok(ChunkCheck::Truncated {
            text,
            original_tokens: tokens.len(),
        })
    }

    /// Validate every chunk, substituting truncated text where needed.
    pub fn prepare(&self, chunks: &[String]) -> Result<Vec<String>> {
        chunks
            .iter()
            .map(|chunk| match self.validate(chunk)? {
                ChunkCheck::WithinLimit => Ok(chunk.clone()),
                ChunkCheck::Truncated { text, .. } => Ok(text),
            })
            .collect()
    }
}
