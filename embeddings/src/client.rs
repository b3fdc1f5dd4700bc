//! Batched embedding requests with timeout and retry.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::Embedding;
use crate::config::EmbeddingClientConfig;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;
use crate::retry::call_with_retry;
use crate::tokenizer::TokenizerRegistry;
use crate::validator::ChunkValidator;

/// Sends chunks to an [`EmbeddingProvider`] in batches.
///
/// Every input is first held to the token ceiling. Each provider call runs
/// under the configured timeout and retry policy; any failure that survives
/// the policy is reported as [`EmbeddingError::GenerationFailed`].
///
/// Construct once per process and share behind an `Arc`.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    tokenizers: Arc<TokenizerRegistry>,
    config: EmbeddingClientConfig,
}

impl EmbeddingClient {
    /// Create a client with default transport settings.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, tokenizers: Arc<TokenizerRegistry>) -> Self {
        Self {
            provider,
            tokenizers,
            config: EmbeddingClientConfig::default(),
        }
    }

    /// Replace the transport settings.
    pub fn with_config(mut self, config: EmbeddingClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport settings in use.
    pub fn config(&self) -> &EmbeddingClientConfig {
        &self.config
    }

    /// The shared tokenizer registry.
    pub fn tokenizers(&self) -> &Arc<TokenizerRegistry> {
        &self.tokenizers
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed `chunks`, returning one vector per chunk in input order.
    ///
    /// `batch_size` and `model` fall back to the client defaults. An empty
    /// input returns immediately without contacting the provider.
    pub async fn embed(
        &self,
        chunks: &[String],
        batch_size: Option<usize>,
        model: Option<&str>,
    ) -> Result<Vec<Embedding>> {
        if chunks.is_empty() {
            debug!("no chunks to embed");
            return Ok(Vec::new());
        }

        let model = model.unwrap_or(&self.config.default_model);
        let batch_size = batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.default_batch_size)
            .max(1);

        self.embed_prepared(chunks, batch_size, model)
            .await
            .map_err(|err| {
                warn!(error = %err, provider = self.provider.name(), "embedding generation failed");
                err.into_generation_failure()
            })
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str, model: Option<&str>) -> Result<Embedding> {
        self.embed(&[text.to_string()], None, model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("no embedding returned for query".to_string())
                    .into_generation_failure()
            })
    }

    async fn embed_prepared(
        &self,
        chunks: &[String],
        batch_size: usize,
        model: &str,
    ) -> Result<Vec<Embedding>> {
        let encoder = self.tokenizers.encoding_for(model)?;
        let validator = ChunkValidator::with_max_tokens(encoder, self.config.max_tokens_per_chunk);
        let prepared = validator.prepare(chunks)?;

        if let [single] = prepared.as_slice() {
            let vectors = self.create_with_retry(std::slice::from_ref(single), model).await?;
            return expect_count(vectors, 1);
        }

        let batch_count = prepared.len().div_ceil(batch_size);
        let mut embeddings = Vec::with_capacity(prepared.len());
        for (i, batch) in prepared.chunks(batch_size).enumerate() {
            debug!(batch = i + 1, batch_count, size = batch.len(), "embedding batch");

            let vectors = self.create_with_retry(batch, model).await?;
            embeddings.extend(expect_count(vectors, batch.len())?);

            if i + 1 < batch_count && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        info!(count = embeddings.len(), batch_count, model, "generated embeddings");
        Ok(embeddings)
    }

    async fn create_with_retry(&self, batch: &[String], model: &str) -> Result<Vec<Embedding>> {
        let timeout = self.config.request_timeout;
        call_with_retry(&self.config.retry, || async move {
            match tokio::time::timeout(timeout, self.provider.create(batch, model)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "embedding call timed out");
                    Err(EmbeddingError::Timeout { after: timeout })
                }
            }
        })
        .await
    }
}

fn expect_count(vectors: Vec<Embedding>, expected: usize) -> Result<Vec<Embedding>> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )))
    }
}
