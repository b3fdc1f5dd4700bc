//! Answer generation from retrieved context.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};
use tracing::{debug, info};

use docrag_embeddings::provider::{OPENAI_BASE_URL, api_error_message};

use crate::error::{Result, RetrievalError};

/// Returned in place of an answer when the answer service fails.
pub const FALLBACK_ANSWER: &str = "I found relevant information but couldn't generate a complete answer. Try asking a more specific question.";

/// Returned when no stored vector matches the query's dimension.
pub const DIMENSION_MISMATCH_ANSWER: &str = "I couldn't generate an answer based on the selected documents. There appears to be an embedding dimension mismatch between your query and the documents.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that provides concise, accurate answers based on the provided context.";

/// Default chat completion model.
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";

/// Build the user prompt for `question` over `context`.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the following question based on the context below:\n\nContext:\n{context}\n\nQuestion:\n{question}"
    )
}

/// Produces an answer to a question given supporting context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Answer `question` using `context`.
    async fn complete(&self, context: &str, question: &str) -> Result<String>;
}

/// Sampling and latency settings for chat completions.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,

    /// Upper bound for one completion call.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub timeout: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 300,
            top_p: 0.9,
            timeout: Duration::from_secs(15),
        }
    }
}

/// OpenAI chat completions client.
pub struct OpenAIChatGenerator {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    settings: ChatSettings,
}

impl OpenAIChatGenerator {
    /// Create a generator using `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            settings: ChatSettings::default(),
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

    /// Set the completion settings.
    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn request(&self, prompt: String) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| RetrievalError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let body = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            top_p: self.settings.top_p,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Answer(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Answer(format!(
                "chat completion failed ({status}): {}",
                api_error_message(&text)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Answer(format!("unreadable completion: {e}")))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();
        if answer.is_empty() {
            return Err(RetrievalError::Answer("empty completion".to_string()));
        }
        Ok(answer)
    }
}

impl Default for OpenAIChatGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIChatGenerator {
    async fn complete(&self, context: &str, question: &str) -> Result<String> {
        debug!(model = %self.settings.model, context_chars = context.len(), "requesting answer");

        let timeout = self.settings.timeout;
        let answer = tokio::time::timeout(timeout, self.request(build_prompt(context, question)))
            .await
            .map_err(|_| {
                RetrievalError::Answer(format!("timed out after {}ms", timeout.as_millis()))
            })??;

        info!(answer_chars = answer.len(), "generated answer");
        Ok(answer)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAIChatGenerator {
        OpenAIChatGenerator::new()
            .with_api_key("sk-test")
            .with_base_url(server.uri())
    }

    #[test]
    fn test_prompt_layout() {
        assert_eq!(
            build_prompt("A\n\nB", "why?"),
            "Answer the following question based on the context below:\n\nContext:\nA\n\nB\n\nQuestion:\nwhy?"
        );
    }

    #[tokio::test]
    async fn test_completion_request_and_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 300,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": build_prompt("ctx", "q?")},
                ],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "  Forty-two. \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = generator(&server).complete("ctx", "q?").await.unwrap();
        assert_eq!(answer, "Forty-two.");
    }

    #[tokio::test]
    async fn test_error_status_is_answer_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = generator(&server).complete("ctx", "q?").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Answer(_)));
    }

    #[tokio::test]
    async fn test_slow_completion_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let settings = ChatSettings {
            timeout: Duration::from_millis(100),
            ..ChatSettings::default()
        };
        let err = generator(&server)
            .with_settings(settings)
            .complete("ctx", "q?")
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Answer(msg) if msg.contains("timed out")));
    }

    #[test]
    fn test_settings_deserialize_seconds() {
        let settings: ChatSettings = serde_json::from_str(r#"{"timeout": 2.5}"#).unwrap();
        assert_eq!(settings.timeout, Duration::from_millis(2500));
        assert_eq!(settings.max_tokens, 300);

        let json = serde_json::to_value(ChatSettings::default()).unwrap();
        assert_eq!(json["timeout"], serde_json::json!(15.0));

        assert!(serde_json::from_str::<ChatSettings>(r#"{"timeout": -1.0}"#).is_err());
    }
}
