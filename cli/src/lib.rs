//! Library half of the `docrag` binary: argument parsing and the command
//! handler, kept here so both can be tested without spawning a process.

pub mod cli;
pub mod handler;

pub use cli::{Cli, Command, IngestArgs, QueryArgs};
pub use handler::{DeleteSummary, DocumentHandler, IngestSummary, error_body};
