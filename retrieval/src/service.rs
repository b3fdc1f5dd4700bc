//! The RAG service: ingest, query, list and delete documents.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use docrag_embeddings::{
    ChunkStats, DocumentContent, DocumentProcessor, EmbeddingClient, EmbeddingClientConfig,
    EmbeddingError, EmbeddingProvider, OpenAIProvider, ProcessOptions, TokenizerRegistry,
};

use crate::answer::{
    AnswerGenerator, DIMENSION_MISMATCH_ANSWER, FALLBACK_ANSWER, OpenAIChatGenerator,
};
use crate::config::{QueryConfig, RagConfig};
use crate::error::{Result, RetrievalError};
use crate::record::{ChunkRecord, DocumentInfo, NewChunk, SearchHit};
use crate::retriever::{RetrievalOutcome, RetrievalStats, SimilarityRetriever};
use crate::store::{ChunkStore, JsonFileStore};
use crate::vector::StoredVector;

/// A natural-language question over the stored documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question.
    pub q: String,

    /// Number of chunks to use; the configured default when absent.
    #[serde(default)]
    pub k: Option<usize>,

    /// Restrict the search to these filenames.
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,

    /// Whether to return the supporting chunks.
    #[serde(default = "default_include_chunks")]
    pub include_chunks: bool,
}

fn default_include_chunks() -> bool {
    true
}

impl QueryRequest {
    /// Create a request with default options.
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            k: None,
            document_ids: None,
            include_chunks: true,
        }
    }

    /// Set the number of chunks.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Restrict the search to `filenames`.
    pub fn with_documents<I, S>(mut self, filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_ids = Some(filenames.into_iter().map(Into::into).collect());
        self
    }

    /// Set whether chunks are returned.
    pub fn with_include_chunks(mut self, include: bool) -> Self {
        self.include_chunks = include;
        self
    }
}

/// How a query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Chunks were ranked and an answer produced.
    Ok,
    /// No stored vector had the query's dimension.
    DimensionMismatch,
}

/// Answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub status: QueryStatus,

    /// Supporting chunks, best first. Absent when not requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<SearchHit>>,

    pub stats: RetrievalStats,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Stored document name.
    pub filename: String,

    /// The stored chunk records, in chunk order.
    pub chunks: Vec<ChunkRecord>,

    /// Token statistics of the chunking pass.
    pub stats: ChunkStats,
}

/// Retrieval-augmented question answering over stored documents.
///
/// Ties a [`ChunkStore`], a [`DocumentProcessor`], a
/// [`SimilarityRetriever`] and an [`AnswerGenerator`] together.
pub struct RagService {
    store: Arc<dyn ChunkStore>,
    processor: Arc<DocumentProcessor>,
    generator: Arc<dyn AnswerGenerator>,
    retriever: SimilarityRetriever,
    query_config: QueryConfig,

    /// Filenames currently being ingested.
    in_flight: Mutex<HashSet<String>>,
}

impl RagService {
    /// Create a new service builder.
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::new()
    }

    /// Assemble a service from its parts.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        processor: Arc<DocumentProcessor>,
        generator: Arc<dyn AnswerGenerator>,
        query_config: QueryConfig,
    ) -> Self {
        Self {
            store,
            processor,
            generator,
            retriever: SimilarityRetriever::new().with_cap(query_config.candidate_cap),
            query_config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Chunk, embed and store a document under `filename`.
    ///
    /// The filename must carry an extension. A filename that is already
    /// stored, or currently being ingested, is a conflict; delete the
    /// document first to replace it.
    pub async fn ingest(
        &self,
        filename: &str,
        content: impl Into<DocumentContent>,
        options: &ProcessOptions,
    ) -> Result<IngestResponse> {
        let filename = filename.trim();
        if filename.is_empty() || !filename.contains('.') {
            return Err(RetrievalError::Validation("Invalid file format".to_string()));
        }

        let text = content.into().decode().into_owned();
        if text.trim().is_empty() {
            return Err(RetrievalError::Validation(
                "Document appears to be empty".to_string(),
            ));
        }

        let _reservation = self.reserve(filename)?;
        if self.store.contains(filename).await? {
            return Err(RetrievalError::Conflict(format!(
                "Document '{filename}' already exists"
            )));
        }

        info!(filename, "processing document");
        let processed = self.processor.process(text, options).await?;
        if processed.chunks.len() != processed.embeddings.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} chunks but {} embeddings",
                processed.chunks.len(),
                processed.embeddings.len()
            ))
            .into());
        }

        let new_chunks: Vec<NewChunk> = processed
            .chunks
            .into_iter()
            .zip(processed.embeddings)
            .enumerate()
            .map(|(i, (text, vector))| NewChunk::new(filename, i, text, StoredVector::raw(vector)))
            .collect();

        let records = self.store.append(new_chunks).await?;
        info!(
            filename,
            chunks = records.len(),
            total_tokens = processed.stats.total_tokens,
            avg_chunk_tokens = processed.stats.avg_chunk_tokens,
            "stored document"
        );

        Ok(IngestResponse {
            filename: filename.to_string(),
            chunks: records,
            stats: processed.stats,
        })
    }

    /// Answer `request` from the most similar stored chunks.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let question = request.q.trim();
        if question.is_empty() {
            return Err(RetrievalError::Validation(
                "Query must not be empty".to_string(),
            ));
        }
        let k = request.k.unwrap_or(self.query_config.default_k);
        if k == 0 {
            return Err(RetrievalError::Validation(
                "k must be greater than zero".to_string(),
            ));
        }

        let filter = request
            .document_ids
            .as_deref()
            .filter(|ids| !ids.is_empty());
        let records = match filter {
            Some(ids) => {
                debug!(documents = ?ids, "filtering query by documents");
                self.store.list_by_filenames(Some(ids), None).await?
            }
            None => {
                self.store
                    .list_by_filenames(None, Some(self.query_config.unfiltered_scan_limit))
                    .await?
            }
        };
        if records.is_empty() {
            return Err(RetrievalError::NotFound(
                "No document embeddings found with the given criteria".to_string(),
            ));
        }

        let model = &self.processor.config().model;
        let query_vector = self
            .processor
            .client()
            .embed_query(question, Some(model.as_str()))
            .await?;

        match self.retriever.retrieve(&query_vector, &records, k)? {
            RetrievalOutcome::DimensionMismatch { stats } => Ok(QueryResponse {
                answer: DIMENSION_MISMATCH_ANSWER.to_string(),
                status: QueryStatus::DimensionMismatch,
                chunks: Some(Vec::new()),
                stats,
            }),
            RetrievalOutcome::NotFound { .. } => Err(RetrievalError::NotFound(
                "No compatible document embeddings found".to_string(),
            )),
            RetrievalOutcome::Ranked { hits, stats } => {
                let context = hits
                    .iter()
                    .map(|hit| hit.chunk_text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");

                let answer = match self.generator.complete(&context, question).await {
                    Ok(answer) => answer,
                    Err(err) => {
                        error!(error = %err, "answer generation failed, using fallback");
                        FALLBACK_ANSWER.to_string()
                    }
                };

                Ok(QueryResponse {
                    answer,
                    status: QueryStatus::Ok,
                    chunks: request.include_chunks.then_some(hits),
                    stats,
                })
            }
        }
    }

    /// Distinct stored documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        self.store.list_documents().await
    }

    /// Delete every chunk of `filename`, returning how many were removed.
    pub async fn delete_document(&self, filename: &str) -> Result<usize> {
        let removed = self.store.delete_all(filename).await?;
        if removed == 0 {
            warn!(filename, "attempted to delete unknown document");
            return Err(RetrievalError::NotFound(format!(
                "Document '{filename}' not found."
            )));
        }
        info!(filename, chunks = removed, "deleted document");
        Ok(removed)
    }

    fn reserve(&self, filename: &str) -> Result<Reservation<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(filename.to_string()) {
            return Err(RetrievalError::Conflict(format!(
                "Document '{filename}' is already being ingested"
            )));
        }
        Ok(Reservation {
            set: &self.in_flight,
            filename: filename.to_string(),
        })
    }
}

/// Releases an in-flight filename on drop.
struct Reservation<'a> {
    set: &'a Mutex<HashSet<String>>,
    filename: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.filename);
    }
}

/// Builder for [`RagService`].
///
/// Any part left unset is built from the [`RagConfig`]: a
/// [`JsonFileStore`] at `store_path`, the OpenAI embedding provider and the
/// OpenAI chat generator.
pub struct RagServiceBuilder {
    config: RagConfig,
    store: Option<Arc<dyn ChunkStore>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    tokenizers: Option<Arc<TokenizerRegistry>>,
    client_config: Option<EmbeddingClientConfig>,
}

impl RagServiceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RagConfig::default(),
            store: None,
            provider: None,
            generator: None,
            tokenizers: None,
            client_config: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` instead of the JSON file store.
    pub fn with_store(mut self, store: Arc<dyn ChunkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `provider` for embeddings.
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use `generator` for answers.
    pub fn with_answer_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Share an existing tokenizer registry.
    pub fn with_tokenizers(mut self, tokenizers: Arc<TokenizerRegistry>) -> Self {
        self.tokenizers = Some(tokenizers);
        self
    }

    /// Override the embedding transport settings.
    pub fn with_client_config(mut self, config: EmbeddingClientConfig) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Build the service.
    pub async fn build(self) -> Result<RagService> {
        let config = self.config;
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::open(&config.store_path).await?),
        };

        let provider = self.provider.unwrap_or_else(|| {
            let mut provider = OpenAIProvider::new();
            if let Some(key) = &config.api_key {
                provider = provider.with_api_key(key);
            }
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        });
        if !provider.is_available() {
            warn!(provider = provider.name(), "embedding provider is not configured");
        }

        let generator = self.generator.unwrap_or_else(|| {
            let mut generator = OpenAIChatGenerator::new().with_settings(config.chat.clone());
            if let Some(key) = &config.api_key {
                generator = generator.with_api_key(key);
            }
            if let Some(url) = &config.base_url {
                generator = generator.with_base_url(url);
            }
            Arc::new(generator)
        });

        let client_config = self.client_config.unwrap_or_else(|| {
            EmbeddingClientConfig::from_processing(&config.processing).with_retry(config.retry)
        });
        let tokenizers = self.tokenizers.unwrap_or_default();
        let client = EmbeddingClient::new(provider, tokenizers).with_config(client_config);
        let processor = DocumentProcessor::new(Arc::new(client), config.processing.clone());

        info!(
            model = %config.processing.model,
            chunk_size = config.processing.chunk_size,
            overlap = config.processing.chunk_overlap,
            "rag service ready"
        );
        Ok(RagService::new(
            store,
            Arc::new(processor),
            generator,
            config.query,
        ))
    }
}

impl Default for RagServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
