//! Chunk storage.
//!
//! The store is a keyed append/query collection. A document's chunks are
//! appended in one call and removed in one call; records are never updated
//! in place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};
use crate::record::{ChunkRecord, DocumentInfo, NewChunk};

/// Persistence for chunk records.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Append every chunk of one document atomically.
    ///
    /// All chunks must share a filename that is not yet stored; otherwise
    /// nothing is written and [`RetrievalError::Conflict`] is returned.
    async fn append(&self, chunks: Vec<NewChunk>) -> Result<Vec<ChunkRecord>>;

    /// Records in insertion order, restricted to `filter` filenames when
    /// given, and truncated to `limit` when given.
    async fn list_by_filenames(
        &self,
        filter: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<ChunkRecord>>;

    /// Remove every record of `filename`, returning how many were removed.
    async fn delete_all(&self, filename: &str) -> Result<usize>;

    /// Distinct documents with their earliest creation time, newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>>;

    /// Whether any record belongs to `filename`.
    async fn contains(&self, filename: &str) -> Result<bool>;
}

/// Record set shared by the store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    last_id: u64,
    records: Vec<ChunkRecord>,
}

impl StoreState {
    fn contains(&self, filename: &str) -> bool {
        self.records.iter().any(|r| r.filename == filename)
    }

    fn append(&mut self, chunks: Vec<NewChunk>, now: DateTime<Utc>) -> Result<Vec<ChunkRecord>> {
        let Some(first) = chunks.first() else {
            return Ok(Vec::new());
        };
        let filename = first.filename.clone();
        if chunks.iter().any(|c| c.filename != filename) {
            return Err(RetrievalError::Validation(
                "all chunks of one append must share a filename".to_string(),
            ));
        }
        if self.contains(&filename) {
            return Err(RetrievalError::Conflict(format!(
                "Document '{filename}' already exists"
            )));
        }

        let start = self.records.len();
        for chunk in chunks {
            self.last_id += 1;
            self.records.push(chunk.into_record(self.last_id, now));
        }
        Ok(self.records[start..].to_vec())
    }

    fn select(&self, filter: Option<&[String]>, limit: Option<usize>) -> Vec<ChunkRecord> {
        self.records
            .iter()
            .filter(|r| filter.is_none_or(|names| names.contains(&r.filename)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn delete_all(&mut self, filename: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.filename != filename);
        before - self.records.len()
    }

    fn documents(&self) -> Vec<DocumentInfo> {
        // filename -> (earliest created_at, first record id)
        let mut earliest: HashMap<&str, (DateTime<Utc>, u64)> = HashMap::new();
        for record in &self.records {
            earliest
                .entry(record.filename.as_str())
                .and_modify(|(time, id)| {
                    if record.created_at < *time {
                        *time = record.created_at;
                    }
                    *id = (*id).min(record.id);
                })
                .or_insert((record.created_at, record.id));
        }

        let mut docs: Vec<_> = earliest.into_iter().collect();
        docs.sort_by(|(_, (t1, id1)), (_, (t2, id2))| t2.cmp(t1).then(id2.cmp(id1)));
        docs.into_iter()
            .map(|(filename, (upload_time, _))| DocumentInfo {
                id: filename.to_string(),
                filename: filename.to_string(),
                upload_time,
            })
            .collect()
    }
}

/// Process-local store. Contents are lost on drop.
#[derive(Default)]
pub struct InMemoryChunkStore {
    state: RwLock<StoreState>,
}

impl InMemoryChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn append(&self, chunks: Vec<NewChunk>) -> Result<Vec<ChunkRecord>> {
        self.state.write().await.append(chunks, Utc::now())
    }

    async fn list_by_filenames(
        &self,
        filter: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<ChunkRecord>> {
        Ok(self.state.read().await.select(filter, limit))
    }

    async fn delete_all(&self, filename: &str) -> Result<usize> {
        Ok(self.state.write().await.delete_all(filename))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        Ok(self.state.read().await.documents())
    }

    async fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self.state.read().await.contains(filename))
    }
}

/// Store backed by a single JSON file.
///
/// The file is read once at open. Every mutation is applied to a copy of
/// the state, written to a sibling temp file and renamed over the original,
/// and only then made visible; a failed write leaves both the file and the
/// in-memory state untouched.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreState::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RetrievalError::Storage(format!("cannot parse {}: {e}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => return Err(err.into()),
        };

        info!(
            path = %path.display(),
            records = state.records.len(),
            "opened chunk store"
        );
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec(state)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "persisted chunk store");
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for JsonFileStore {
    async fn append(&self, chunks: Vec<NewChunk>) -> Result<Vec<ChunkRecord>> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let records = next.append(chunks, Utc::now())?;
        if records.is_empty() {
            return Ok(records);
        }
        self.persist(&next).await?;
        *state = next;
        Ok(records)
    }

    async fn list_by_filenames(
        &self,
        filter: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<ChunkRecord>> {
        Ok(self.state.read().await.select(filter, limit))
    }

    async fn delete_all(&self, filename: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let removed = next.delete_all(filename);
        if removed > 0 {
            self.persist(&next).await?;
            *state = next;
        }
        Ok(removed)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        Ok(self.state.read().await.documents())
    }

    async fn contains(&self, filename: &str) -> Result<bool> {
        Ok(self.state.read().await.contains(filename))
    }
}
