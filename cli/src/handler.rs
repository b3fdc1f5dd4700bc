//! Command handler for the `docrag` binary.
//!
//! Runs one parsed [`Command`] against a [`RagService`] and shapes the
//! result for JSON output.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use docrag_embeddings::{ChunkStats, ProcessOptions};
use docrag_retrieval::{RagConfig, RagService, RetrievalError};

use crate::cli::Command;

/// Summary of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub filename: String,
    pub chunks: usize,
    pub stats: ChunkStats,
}

/// Summary of a deleted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub filename: String,
    pub deleted_chunks: usize,
}

/// Runs commands against a [`RagService`].
pub struct DocumentHandler {
    service: RagService,
}

impl DocumentHandler {
    pub fn new(service: RagService) -> Self {
        Self { service }
    }

    /// Build the service described by `config`.
    pub async fn from_config(config: RagConfig) -> Result<Self> {
        info!(store = %config.store_path.display(), "opening document store");
        let service = RagService::builder()
            .with_config(config)
            .build()
            .await
            .context("failed to start the document service")?;
        Ok(Self::new(service))
    }

    /// Run `command` and return its JSON output.
    pub async fn handle(&self, command: Command) -> Result<Value> {
        match command {
            Command::Ingest(args) => {
                let filename = args
                    .filename()
                    .with_context(|| format!("cannot name {}", args.path.display()))?;
                let summary = self
                    .ingest_file(&args.path, &filename, &args.options())
                    .await?;
                Ok(serde_json::to_value(summary)?)
            }
            Command::Query(args) => {
                let response = self.service.query(&args.request()).await?;
                Ok(serde_json::to_value(response)?)
            }
            Command::List => {
                let documents = self.service.list_documents().await?;
                Ok(json!({ "documents": documents }))
            }
            Command::Delete { filename } => {
                let deleted_chunks = self.service.delete_document(&filename).await?;
                Ok(serde_json::to_value(DeleteSummary {
                    filename,
                    deleted_chunks,
                })?)
            }
        }
    }

    /// Read `path` and ingest it as `filename`.
    pub async fn ingest_file(
        &self,
        path: &Path,
        filename: &str,
        options: &ProcessOptions,
    ) -> Result<IngestSummary> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let response = self.service.ingest(filename, bytes, options).await?;
        Ok(IngestSummary {
            filename: response.filename,
            chunks: response.chunks.len(),
            stats: response.stats,
        })
    }
}

/// JSON body describing a failed command.
///
/// Service errors carry their HTTP-style status and client-facing detail;
/// anything else is reported as an internal error.
pub fn error_body(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<RetrievalError>() {
        Some(err) => json!({
            "status": err.status_code().as_u16(),
            "detail": err.detail(),
        }),
        None => json!({
            "status": 500,
            "detail": format!("{err:#}"),
        }),
    }
}
