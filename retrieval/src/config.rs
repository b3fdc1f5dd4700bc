//! Configuration for the RAG service.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use docrag_embeddings::{ProcessingConfig, RetrySettings};

use crate::answer::ChatSettings;
use crate::error::{Result, RetrievalError};
use crate::retriever::CandidateCap;

/// Default location of the JSON chunk store.
pub const DEFAULT_STORE_PATH: &str = "docrag-store.json";

/// Configuration for the RAG service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// OpenAI API key. Read from the environment, never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Override for the OpenAI API root.
    pub base_url: Option<String>,

    /// Chunking and embedding defaults.
    pub processing: ProcessingConfig,

    /// Backoff for embedding calls.
    pub retry: RetrySettings,

    /// Query processing configuration.
    pub query: QueryConfig,

    /// Answer generation settings.
    pub chat: ChatSettings,

    /// Path of the JSON chunk store.
    pub store_path: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            processing: ProcessingConfig::default(),
            retry: RetrySettings::default(),
            query: QueryConfig::default(),
            chat: ChatSettings::default(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl RagConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from `lookup`, treating blank values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL"),
            ..Self::default()
        };

        if let Some(model) = get("OPENAI_EMBEDDING_MODEL") {
            config.processing.model = model;
        }
        if let Some(model) = get("OPENAI_COMPLETION_MODEL") {
            config.chat.model = model;
        }
        if let Some(value) = get("CHUNK_SIZE") {
            config.processing.chunk_size = parse_var("CHUNK_SIZE", &value)?;
        }
        if let Some(value) = get("CHUNK_OVERLAP") {
            config.processing.chunk_overlap = parse_var("CHUNK_OVERLAP", &value)?;
        }
        if let Some(value) = get("EMBEDDING_BATCH_SIZE") {
            config.processing.batch_size = parse_var("EMBEDDING_BATCH_SIZE", &value)?;
        }
        if let Some(path) = get("DOCRAG_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.processing.chunk_size == 0 {
            return Err(RetrievalError::Config(
                "CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.processing.batch_size == 0 {
            return Err(RetrievalError::Config(
                "EMBEDDING_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the store path.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RetrievalError::Config(format!("{key}={value:?}: {e}")))
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Results returned when a request does not say.
    pub default_k: usize,

    /// Records scanned for an unfiltered query.
    pub unfiltered_scan_limit: usize,

    /// Bound on scored candidates.
    pub candidate_cap: CandidateCap,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            unfiltered_scan_limit: 500,
            candidate_cap: CandidateCap::default(),
        }
    }
}
