//! Token-window chunking.
//!
//! Text is tokenized once and cut into windows of `chunk_size` tokens whose
//! starts advance by `chunk_size - overlap`. Each window is decoded back to
//! text, so chunk boundaries always fall on token boundaries.

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::tokenizer::Encoder;

/// Aggregate token statistics for a chunked document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkStats {
    /// Tokens in the whole document.
    pub total_tokens: usize,

    /// Number of chunks produced.
    pub chunk_count: usize,

    /// Mean tokens per chunk.
    pub avg_chunk_tokens: f64,

    /// Smallest chunk, in tokens.
    pub min_chunk_tokens: usize,

    /// Largest chunk, in tokens.
    pub max_chunk_tokens: usize,
}

impl ChunkStats {
    fn from_spans(total_tokens: usize, spans: &[Range<usize>]) -> Self {
        if spans.is_empty() {
            return Self {
                total_tokens,
                ..Self::default()
            };
        }

        let sizes = spans.iter().map(ExactSizeIterator::len);
        let sum: usize = sizes.clone().sum();
        Self {
            total_tokens,
            chunk_count: spans.len(),
            avg_chunk_tokens: sum as f64 / spans.len() as f64,
            min_chunk_tokens: sizes.clone().min().unwrap_or(0),
            max_chunk_tokens: sizes.max().unwrap_or(0),
        }
    }
}

/// Output of [`TokenChunker::chunk`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkedText {
    /// Chunk texts in document order.
    pub chunks: Vec<String>,

    /// Token range of each chunk within the document.
    pub spans: Vec<Range<usize>>,

    /// Token statistics.
    pub stats: ChunkStats,
}

/// Compute the token windows for a document of `total` tokens.
///
/// A stride of `chunk_size - overlap` tokens separates window starts; when
/// `overlap >= chunk_size` the stride is 1. Once the tokens past the next
/// start fit in a single window they are emitted as the last (possibly
/// short) window, so the tail is never dropped and never repeated.
pub fn window_spans(total: usize, chunk_size: usize, overlap: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if total == 0 || chunk_size == 0 {
        return spans;
    }

    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(total);
        spans.push(start..end);
        if end == total {
            break;
        }
        start += stride;
    }
    spans
}

/// Splits text into overlapping token windows.
pub struct TokenChunker {
    encoder: Arc<dyn Encoder>,
}

impl TokenChunker {
    /// Create a chunker that tokenizes with `encoder`.
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Chunk `text` into windows of `chunk_size` tokens overlapping by
    /// `overlap` tokens.
    ///
    /// Blank input yields no chunks and zeroed statistics.
    pub fn chunk(&self, text: &str, chunk_size: usize, overlap: usize) -> Result<ChunkedText> {
        if chunk_size == 0 {
            return Err(EmbeddingError::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Ok(ChunkedText::default());
        }

        let tokens = self.encoder.encode(text);
        let spans = window_spans(tokens.len(), chunk_size, overlap);

        let chunks = spans
            .iter()
            .map(|span| self.encoder.decode(&tokens[span.clone()]))
            .collect::<Result<Vec<_>>>()?;

        let stats = ChunkStats::from_spans(tokens.len(), &spans);
        debug!(
            encoder = self.encoder.name(),
            total_tokens = stats.total_tokens,
            chunk_count = stats.chunk_count,
            avg_chunk_tokens = stats.avg_chunk_tokens,
            "chunked text"
        );

        Ok(ChunkedText {
            chunks,
            spans,
            stats,
        })
    }
}
