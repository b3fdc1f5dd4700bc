//! Stored vector encodings.
//!
//! Vectors written by this crate are stored as native float arrays. Older
//! rows hold the vector as a JSON string, and some of those were encoded
//! twice (a JSON string whose content is the JSON array). Both shapes are
//! read transparently. Any other value is kept as-is so that one corrupt
//! row never stops the rest of the store from loading; it fails to decode
//! and is skipped at query time.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use docrag_embeddings::Embedding;

/// A vector as persisted alongside its chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredVector {
    /// Native float array.
    Raw(Vec<f32>),
    /// Serialized JSON text.
    Encoded(String),
    /// Anything else found in storage.
    Invalid(serde_json::Value),
}

/// A stored vector that could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed stored vector: {0}")]
pub struct MalformedVector(pub String);

/// One layer of a serialized vector.
#[derive(Deserialize)]
#[serde(untagged)]
enum EncodedLayer {
    Vector(Vec<f32>),
    Nested(String),
}

impl StoredVector {
    /// Store `vector` in its native form.
    pub fn raw(vector: Embedding) -> Self {
        Self::Raw(vector)
    }

    /// Decode to floats, borrowing when the vector is already native.
    pub fn decode(&self) -> Result<Cow<'_, [f32]>, MalformedVector> {
        match self {
            Self::Raw(vector) => Ok(Cow::Borrowed(vector)),
            Self::Encoded(text) => decode_text(text).map(Cow::Owned),
            Self::Invalid(value) => Err(MalformedVector(format!(
                "unexpected {} in place of a vector",
                value_kind(value)
            ))),
        }
    }
}

impl From<Embedding> for StoredVector {
    fn from(vector: Embedding) -> Self {
        Self::Raw(vector)
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn decode_text(text: &str) -> Result<Vec<f32>, MalformedVector> {
    match serde_json::from_str::<EncodedLayer>(text) {
        Ok(EncodedLayer::Vector(vector)) => Ok(vector),
        Ok(EncodedLayer::Nested(inner)) => serde_json::from_str::<Vec<f32>>(&inner)
            .map_err(|e| MalformedVector(format!("double-encoded vector: {e}"))),
        Err(e) => Err(MalformedVector(e.to_string())),
    }
}
