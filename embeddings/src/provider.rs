//! Embedding providers.
//!
//! A provider turns one batch of texts into one vector per text, in input
//! order. Retries, timeouts and batching live in [`crate::EmbeddingClient`];
//! providers only translate a single call and classify its failures.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Default OpenAI API root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Embed every text in `batch` with `model`.
    ///
    /// The result holds exactly one vector per input, in input order.
    async fn create(&self, batch: &[String], model: &str) -> Result<Vec<Embedding>>;

    /// Check if the provider is available (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// OpenAI embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a provider using `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn create(&self, batch: &[String], model: &str) -> Result<Vec<Embedding>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        debug!(model, inputs = batch.len(), "requesting embeddings");

        let body = serde_json::json!({
            "input": batch,
            "model": model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(EmbeddingError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let text = response.text().await.map_err(classify_transport_error)?;
        let parsed: OpenAIEmbeddingResponse = serde_json::from_str(&text)?;
        order_by_index(parsed.data, batch.len())
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Map a transport failure onto the retry-relevant variants.
pub fn classify_transport_error(err: reqwest::Error) -> EmbeddingError {
    if err.is_connect() {
        EmbeddingError::Connection(err.to_string())
    } else {
        EmbeddingError::Http(err)
    }
}

/// Pull `error.message` out of an OpenAI error body, or fall back to the
/// raw body.
pub fn api_error_message(body: &str) -> String {
    serde_json::from_str::<OpenAIErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn order_by_index(mut data: Vec<OpenAIEmbeddingData>, expected: usize) -> Result<Vec<Embedding>> {
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|item| item.index);
    if data.iter().enumerate().any(|(i, item)| item.index != i) {
        return Err(EmbeddingError::InvalidResponse(
            "embedding indices are not a permutation of the inputs".to_string(),
        ));
    }
    Ok(data.into_iter().map(|item| item.embedding).collect())
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(index: usize, value: f32) -> OpenAIEmbeddingData {
        OpenAIEmbeddingData {
            embedding: vec![value],
            index,
        }
    }

    #[test]
    fn test_items_are_reordered_by_index() {
        let ordered = order_by_index(vec![item(2, 2.0), item(0, 0.0), item(1, 1.0)], 3).unwrap();
        assert_eq!(ordered, vec![vec![0.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_count_mismatch_is_invalid_response() {
        let err = order_by_index(vec![item(0, 0.0)], 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[test]
    fn test_duplicate_index_is_invalid_response() {
        let err = order_by_index(vec![item(0, 0.0), item(0, 1.0)], 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[test]
    fn test_api_error_message_extraction() {
        let body = r#"{"error": {"message": "Invalid model", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Invalid model");
        assert_eq!(api_error_message("  upstream exploded \n"), "upstream exploded");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let provider = OpenAIProvider {
            api_key: None,
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        };
        assert!(!provider.is_available());

        let err = provider
            .create(&["hello".to_string()], "text-embedding-3-small")
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderNotConfigured));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let provider = OpenAIProvider::new()
            .with_api_key("sk-test")
            .with_base_url("http://localhost:9999/v1/");
        assert_eq!(provider.base_url, "http://localhost:9999/v1");
        assert!(provider.is_available());
    }
}
