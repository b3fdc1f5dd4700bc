//! # Embeddings
//!
//! This crate turns documents into token-bounded chunks and embedding
//! vectors for the docrag retrieval pipeline.
//!
//! ## Features
//!
//! - **Tokenization**: model-aware BPE encoders, cached per process
//! - **Chunking**: overlapping token windows with aggregate statistics
//! - **Validation**: per-chunk token ceiling with truncation
//! - **Embedding**: batched provider calls with timeout and bounded retry
//! - **Similarity**: cosine scoring for single pairs or whole batches
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DocumentProcessor                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DocumentContent ──► TokenChunker ──► ChunkValidator            │
//! │                           │                  │                  │
//! │                           ▼                  ▼                  │
//! │                  TokenizerRegistry    EmbeddingClient           │
//! │                                        │  RetryPolicy           │
//! │                                        ▼                        │
//! │                                 EmbeddingProvider (OpenAI)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docrag_embeddings::*;
//!
//! let tokenizers = Arc::new(TokenizerRegistry::new());
//! let client = Arc::new(EmbeddingClient::new(Arc::new(OpenAIProvider::new()), tokenizers));
//! let processor = DocumentProcessor::new(client, ProcessingConfig::default());
//!
//! let doc = processor.process("Some long text...", &ProcessOptions::default()).await?;
//! assert_eq!(doc.chunks.len(), doc.embeddings.len());
//! ```

pub mod chunker;
pub mod client;
pub mod config;
pub mod error;
pub mod processor;
pub mod provider;
pub mod retry;
pub mod similarity;
pub mod tokenizer;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use chunker::{ChunkStats, ChunkedText, TokenChunker, window_spans};
pub use client::EmbeddingClient;
pub use config::{DEFAULT_EMBEDDING_MODEL, EmbeddingClientConfig, ProcessingConfig};
pub use error::{EmbeddingError, FailureKind, Result};
pub use processor::{DocumentContent, DocumentProcessor, ProcessOptions, ProcessedDocument};
pub use provider::{EmbeddingProvider, OpenAIProvider};
pub use retry::{RetryPolicy, RetrySettings, call_with_retry};
pub use similarity::{cosine_similarity, cosine_similarity_batch};
pub use tokenizer::{DEFAULT_ENCODING, Encoder, TiktokenEncoder, Token, TokenizerRegistry};
pub use validator::{ChunkCheck, ChunkValidator, MAX_TOKENS_PER_CHUNK};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
