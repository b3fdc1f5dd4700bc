//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use docrag_embeddings::ProcessOptions;
use docrag_retrieval::QueryRequest;

/// Ask questions about your documents.
#[derive(Debug, Parser)]
#[command(name = "docrag", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and store a document.
    Ingest(IngestArgs),

    /// Answer a question from the stored documents.
    Query(QueryArgs),

    /// List stored documents, newest first.
    List,

    /// Delete a document and all of its chunks.
    Delete {
        /// Stored document name.
        filename: String,
    },
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// File to ingest.
    pub path: PathBuf,

    /// Store the document under this name instead of the file name.
    #[arg(long)]
    pub name: Option<String>,

    /// Tokens per chunk.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Tokens shared by consecutive chunks.
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Chunks per embedding request.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Embedding model.
    #[arg(long)]
    pub model: Option<String>,
}

impl IngestArgs {
    /// Per-call processing overrides.
    pub fn options(&self) -> ProcessOptions {
        ProcessOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.overlap,
            batch_size: self.batch_size,
            model: self.model.clone(),
        }
    }

    /// Name to store the document under.
    pub fn filename(&self) -> Option<String> {
        self.name.clone().or_else(|| {
            self.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
    }
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// The question.
    pub text: String,

    /// Number of chunks to answer from.
    #[arg(short)]
    pub k: Option<usize>,

    /// Only search this document. Repeat for several.
    #[arg(long = "doc", value_name = "FILENAME")]
    pub documents: Vec<String>,

    /// Leave the supporting chunks out of the output.
    #[arg(long)]
    pub no_chunks: bool,
}

impl QueryArgs {
    pub fn request(&self) -> QueryRequest {
        QueryRequest {
            q: self.text.clone(),
            k: self.k,
            document_ids: (!self.documents.is_empty()).then(|| self.documents.clone()),
            include_chunks: !self.no_chunks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from([
            "docrag",
            "ingest",
            "notes/today.md",
            "--chunk-size",
            "500",
            "--overlap",
            "0",
        ])
        .unwrap();

        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.filename().as_deref(), Some("today.md"));
        assert_eq!(
            args.options(),
            ProcessOptions {
                chunk_size: Some(500),
                chunk_overlap: Some(0),
                ..ProcessOptions::default()
            }
        );
    }

    #[test]
    fn test_name_overrides_file_name() {
        let cli =
            Cli::try_parse_from(["docrag", "ingest", "a.txt", "--name", "renamed.txt"]).unwrap();
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.filename().as_deref(), Some("renamed.txt"));
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "docrag", "query", "what now?", "-k", "3", "--doc", "a.txt", "--doc", "b.txt",
            "--no-chunks",
        ])
        .unwrap();

        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(
            args.request(),
            QueryRequest::new("what now?")
                .with_k(3)
                .with_documents(["a.txt", "b.txt"])
                .with_include_chunks(false)
        );
    }

    #[test]
    fn test_query_without_docs_is_unfiltered() {
        let cli = Cli::try_parse_from(["docrag", "query", "anything"]).unwrap();
        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.request(), QueryRequest::new("anything"));
    }
}
