//! Document processing: decode, chunk, embed.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::chunker::{ChunkStats, TokenChunker};
use crate::client::EmbeddingClient;
use crate::config::ProcessingConfig;
use crate::error::{EmbeddingError, Result};

/// Raw document content as handed over by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Already-decoded text.
    Text(String),
    /// Undecoded bytes; UTF-8 with a single-byte fallback.
    Bytes(Vec<u8>),
}

impl DocumentContent {
    /// Decode to text. Never fails: bytes that are not valid UTF-8 are read
    /// as Windows-1252.
    pub fn decode(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Cow::Borrowed(text),
                Err(_) => {
                    warn!(bytes = bytes.len(), "content is not valid UTF-8, decoding as windows-1252");
                    let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
                    text
                }
            },
        }
    }
}

impl From<String> for DocumentContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for DocumentContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for DocumentContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for DocumentContent {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Per-call overrides of [`ProcessingConfig`]. `None` keeps the default;
/// `Some(0)` overlap is honoured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub batch_size: Option<usize>,
    pub model: Option<String>,
}

/// Chunks of one document with their vectors, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDocument {
    /// Chunk texts in document order.
    pub chunks: Vec<String>,

    /// One vector per chunk.
    pub embeddings: Vec<Embedding>,

    /// Token statistics of the chunking pass.
    pub stats: ChunkStats,
}

impl ProcessedDocument {
    /// Whether the document produced no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Runs chunker, validator and embedding client over one document.
pub struct DocumentProcessor {
    client: Arc<EmbeddingClient>,
    config: ProcessingConfig,
}

impl DocumentProcessor {
    /// Create a processor that uses `client` for tokenizers and embeddings.
    pub fn new(client: Arc<EmbeddingClient>, config: ProcessingConfig) -> Self {
        Self { client, config }
    }

    /// Processing defaults.
    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// The embedding client.
    pub fn client(&self) -> &Arc<EmbeddingClient> {
        &self.client
    }

    /// Decode, chunk and embed `content`.
    ///
    /// Blank content yields an empty document without contacting the
    /// embedding service.
    pub async fn process(
        &self,
        content: impl Into<DocumentContent>,
        options: &ProcessOptions,
    ) -> Result<ProcessedDocument> {
        let content = content.into();
        let text = content.decode();
        if text.trim().is_empty() {
            debug!("content is empty or whitespace only");
            return Ok(ProcessedDocument::default());
        }

        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let chunk_size = options.chunk_size.unwrap_or(self.config.chunk_size);
        let overlap = options.chunk_overlap.unwrap_or(self.config.chunk_overlap);
        if chunk_size == 0 {
            return Err(EmbeddingError::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        let encoder = self.client.tokenizers().encoding_for(model)?;
        let chunked = TokenChunker::new(encoder).chunk(&text, chunk_size, overlap)?;
        info!(
            model,
            chunk_size,
            overlap,
            chunks = chunked.stats.chunk_count,
            total_tokens = chunked.stats.total_tokens,
            "chunked document"
        );

        let embeddings = self
            .client
            .embed(&chunked.chunks, options.batch_size, Some(model))
            .await?;

        Ok(ProcessedDocument {
            chunks: chunked.chunks,
            embeddings,
            stats: chunked.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingClientConfig;
    use crate::test_support::{CharEncoder, FakeProvider};
    use crate::tokenizer::TokenizerRegistry;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn processor(provider: Arc<FakeProvider>) -> DocumentProcessor {
        let client = EmbeddingClient::new(
            provider,
            Arc::new(TokenizerRegistry::fixed(Arc::new(CharEncoder))),
        )
        .with_config(EmbeddingClientConfig::default().with_batch_delay(Duration::ZERO));
        DocumentProcessor::new(
            Arc::new(client),
            ProcessingConfig::default().with_chunking(10, 2),
        )
    }

    #[test]
    fn test_bytes_decode_utf8_then_single_byte() {
        let utf8 = DocumentContent::from("naïve café".as_bytes());
        assert_eq!(utf8.decode(), "naïve café");

        // 0xE9 alone is not UTF-8; windows-1252 reads it as 'é'.
        let legacy = DocumentContent::from(vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(legacy.decode(), "café");
    }

    #[tokio::test]
    async fn test_blank_content_skips_embedding() {
        let provider = Arc::new(FakeProvider::new());
        let out = processor(provider.clone())
            .process("  \n ", &ProcessOptions::default())
            .await
            .unwrap();

        assert!(out.is_empty());
        assert_eq!(out.stats, ChunkStats::default());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_chunks_and_vectors_are_aligned() {
        let provider = Arc::new(FakeProvider::new());
        let text: String = ('a'..='z').collect();
        let out = processor(provider)
            .process(text, &ProcessOptions::default())
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), out.embeddings.len());
        assert_eq!(out.stats.chunk_count, out.chunks.len());
        for (chunk, vector) in out.chunks.iter().zip(&out.embeddings) {
            assert_eq!(vector, &FakeProvider::vector_for(chunk));
        }
    }

    #[tokio::test]
    async fn test_zero_overlap_override_is_honoured() {
        let provider = Arc::new(FakeProvider::new());
        let options = ProcessOptions {
            chunk_size: Some(5),
            chunk_overlap: Some(0),
            ..ProcessOptions::default()
        };
        let out = processor(provider)
            .process("abcdefghijkl", &options)
            .await
            .unwrap();

        assert_eq!(out.chunks, vec!["abcde", "fghij", "kl"]);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_rejected() {
        let provider = Arc::new(FakeProvider::new());
        let options = ProcessOptions {
            chunk_size: Some(0),
            ..ProcessOptions::default()
        };
        let err = processor(provider).process("abc", &options).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidInput(_)));
    }
}
