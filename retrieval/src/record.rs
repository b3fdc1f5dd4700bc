//! Stored chunk records and the views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vector::StoredVector;

/// One chunk of one document, with its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Store-assigned id, unique and increasing in insertion order.
    pub id: u64,

    /// Owning document.
    pub filename: String,

    /// Zero-based position of the chunk within its document.
    pub chunk_id: usize,

    /// Chunk text.
    pub chunk_text: String,

    /// The chunk's embedding.
    pub embedding: StoredVector,

    /// When the chunk was stored.
    pub created_at: DateTime<Utc>,
}

/// A chunk about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub filename: String,
    pub chunk_id: usize,
    pub chunk_text: String,
    pub embedding: StoredVector,
}

impl NewChunk {
    /// Create a new chunk.
    pub fn new(
        filename: impl Into<String>,
        chunk_id: usize,
        chunk_text: impl Into<String>,
        embedding: impl Into<StoredVector>,
    ) -> Self {
        Self {
            filename: filename.into(),
            chunk_id,
            chunk_text: chunk_text.into(),
            embedding: embedding.into(),
        }
    }

    pub(crate) fn into_record(self, id: u64, created_at: DateTime<Utc>) -> ChunkRecord {
        ChunkRecord {
            id,
            filename: self.filename,
            chunk_id: self.chunk_id,
            chunk_text: self.chunk_text,
            embedding: self.embedding,
            created_at,
        }
    }
}

/// A document as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Document id; the filename.
    pub id: String,

    /// Filename.
    pub filename: String,

    /// Creation time of the document's earliest chunk.
    pub upload_time: DateTime<Utc>,
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    pub filename: String,
    pub chunk_id: usize,
    pub chunk_text: String,

    /// Cosine similarity, rounded to 4 decimals.
    pub score: f32,
}

impl SearchHit {
    pub(crate) fn from_record(record: &ChunkRecord, score: f32) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            chunk_id: record.chunk_id,
            chunk_text: record.chunk_text.clone(),
            score,
        }
    }
}
