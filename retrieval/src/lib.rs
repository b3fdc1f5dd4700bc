//! # Document Retrieval
//!
//! Storage, similarity search and answer generation on top of
//! `docrag-embeddings`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          RagService                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ingest ──▶ DocumentProcessor ──▶ ChunkStore (append)           │
//! │                                                                 │
//! │  query  ──▶ ChunkStore (scan) ──▶ EmbeddingClient (query vec)   │
//! │                     │                                           │
//! │                     ▼                                           │
//! │            SimilarityRetriever ──▶ AnswerGenerator              │
//! │                                                                 │
//! │  list / delete ──▶ ChunkStore                                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docrag_retrieval::{QueryRequest, RagConfig, RagService};
//!
//! let service = RagService::builder()
//!     .with_config(RagConfig::from_env()?)
//!     .build()
//!     .await?;
//!
//! service.ingest("notes.txt", text, &Default::default()).await?;
//! let response = service.query(&QueryRequest::new("What changed?")).await?;
//! ```

pub mod answer;
pub mod config;
pub mod error;
pub mod record;
pub mod retriever;
pub mod service;
pub mod store;
pub mod vector;

pub use answer::{
    AnswerGenerator, ChatSettings, DIMENSION_MISMATCH_ANSWER, FALLBACK_ANSWER,
    OpenAIChatGenerator, build_prompt,
};
pub use config::{DEFAULT_STORE_PATH, QueryConfig, RagConfig};
pub use error::{Result, RetrievalError};
pub use record::{ChunkRecord, DocumentInfo, NewChunk, SearchHit};
pub use retriever::{CandidateCap, RetrievalOutcome, RetrievalStats, SimilarityRetriever};
pub use service::{
    IngestResponse, QueryRequest, QueryResponse, QueryStatus, RagService, RagServiceBuilder,
};
pub use store::{ChunkStore, InMemoryChunkStore, JsonFileStore};
pub use vector::{MalformedVector, StoredVector};
