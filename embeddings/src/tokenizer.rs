//! Model-aware tokenization.
//!
//! Every embedding model counts its input in BPE tokens. The
//! [`TokenizerRegistry`] resolves a model name to an [`Encoder`] once and
//! hands out shared handles afterwards; unknown models resolve to
//! `cl100k_base` instead of failing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::error::{EmbeddingError, Result};

/// A single BPE token id.
pub type Token = u32;

/// Encoding used when a model has no tokenizer of its own.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Converts between text and token sequences.
pub trait Encoder: Send + Sync {
    /// Name of the encoding (or model) this encoder serves.
    fn name(&self) -> &str;

    /// Tokenize text.
    fn encode(&self, text: &str) -> Vec<Token>;

    /// Turn a token slice back into text.
    fn decode(&self, tokens: &[Token]) -> Result<String>;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// [`Encoder`] backed by a tiktoken BPE table.
pub struct TiktokenEncoder {
    name: String,
    bpe: CoreBPE,
}

impl TiktokenEncoder {
    /// Load the tokenizer registered for `model`, or the default encoding
    /// when tiktoken does not know the model.
    pub fn for_model(model: &str) -> Result<Self> {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self {
                name: model.to_string(),
                bpe,
            }),
            Err(err) => {
                debug!(model, error = %err, "no tokenizer for model, using {DEFAULT_ENCODING}");
                Self::default_encoding()
            }
        }
    }

    /// Load the default `cl100k_base` encoding.
    pub fn default_encoding() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| EmbeddingError::Tokenizer(format!("{DEFAULT_ENCODING}: {e}")))?;
        Ok(Self {
            name: DEFAULT_ENCODING.to_string(),
            bpe,
        })
    }
}

impl Encoder for TiktokenEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        self.bpe.encode_ordinary(text)
    }

    /// Window edges can land inside a multi-byte character; such slices
    /// decode with U+FFFD in place of the partial bytes.
    fn decode(&self, tokens: &[Token]) -> Result<String> {
        match String::from_utf8(
            self.bpe
                ._decode_native_and_split(tokens.to_vec())
                .flatten()
                .collect::<Vec<u8>>(),
        ) {
            Ok(text) => Ok(text),
            Err(err) => {
                debug!(
                    encoder = %self.name,
                    tokens = tokens.len(),
                    "slice splits a multi-byte character, decoding lossily"
                );
                Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
            }
        }
    }
}

/// Process-wide cache of encoders keyed by model name.
///
/// Construct one per process and share it; loading a BPE table is
/// comparatively expensive.
#[derive(Default)]
pub struct TokenizerRegistry {
    encoders: Mutex<HashMap<String, Arc<dyn Encoder>>>,
    fixed: Option<Arc<dyn Encoder>>,
}

impl TokenizerRegistry {
    /// Create an empty registry backed by tiktoken.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that answers every model with `encoder`.
    pub fn fixed(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoders: Mutex::new(HashMap::new()),
            fixed: Some(encoder),
        }
    }

    /// Get the encoder for `model`, loading it on first use.
    pub fn encoding_for(&self, model: &str) -> Result<Arc<dyn Encoder>> {
        if let Some(encoder) = &self.fixed {
            return Ok(Arc::clone(encoder));
        }

        let mut encoders = self
            .encoders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(encoder) = encoders.get(model) {
            return Ok(Arc::clone(encoder));
        }

        let encoder: Arc<dyn Encoder> = Arc::new(TiktokenEncoder::for_model(model)?);
        encoders.insert(model.to_string(), Arc::clone(&encoder));
        Ok(encoder)
    }
}
