//! Deterministic stand-ins for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;
use crate::tokenizer::{Encoder, Token};

/// One token per `char`, so token counts equal character counts.
pub struct CharEncoder;

impl Encoder for CharEncoder {
    fn name(&self) -> &str {
        "chars"
    }

    fn encode(&self, text: &str) -> Vec<Token> {
        text.chars().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[Token]) -> Result<String> {
        tokens
            .iter()
            .map(|t| {
                char::from_u32(*t)
                    .ok_or_else(|| EmbeddingError::Tokenizer(format!("invalid code point {t}")))
            })
            .collect()
    }
}

/// What a [`FakeProvider`] does on one call.
pub enum Step {
    Fail(EmbeddingError),
    Stall(Duration),
}

/// Provider that embeds text as `[char_count, byte_sum]` and records every
/// batch it receives. Queued steps are consumed one per call before the
/// provider starts succeeding.
#[derive(Default)]
pub struct FakeProvider {
    calls: Mutex<Vec<Vec<String>>>,
    script: Mutex<VecDeque<Step>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, step: Step) -> Self {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(step);
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn vector_for(text: &str) -> Embedding {
        vec![
            text.chars().count() as f32,
            text.bytes().map(f32::from).sum(),
        ]
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self, batch: &[String], _model: &str) -> Result<Vec<Embedding>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(batch.to_vec());

        let step = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        match step {
            Some(Step::Fail(err)) => return Err(err),
            Some(Step::Stall(duration)) => tokio::time::sleep(duration).await,
            None => {}
        }

        Ok(batch.iter().map(|text| Self::vector_for(text)).collect())
    }

    fn is_available(&self) -> bool {
        true
    }
}
