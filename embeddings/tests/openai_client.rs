//! End-to-end tests for the OpenAI provider behind the embedding client,
//! against a mocked HTTP endpoint.

use std::sync::Arc;
use std::time::Duration;

use docrag_embeddings::{
    DocumentProcessor, EmbeddingClient, EmbeddingClientConfig, EmbeddingError, FailureKind,
    OpenAIProvider, ProcessOptions, ProcessingConfig, RetryPolicy, TokenizerRegistry,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers each input with `[len, position]`, listing items in reverse
/// order so the client has to sort by `index`.
struct ReversedEmbeddings;

impl Respond for ReversedEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let inputs: Vec<String> = body["input"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| {
                json!({
                    "object": "embedding",
                    "index": i,
                    "embedding": [text.len() as f32, i as f32],
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
            "model": body["model"],
            "usage": {"prompt_tokens": 1, "total_tokens": 1},
        }))
    }
}

fn client_for(server: &MockServer) -> EmbeddingClient {
    let provider = OpenAIProvider::new()
        .with_api_key("sk-test")
        .with_base_url(server.uri());
    let config = EmbeddingClientConfig {
        request_timeout: Duration::from_millis(300),
        batch_delay: Duration::from_millis(1),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(5),
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            ..RetryPolicy::default()
        },
        ..EmbeddingClientConfig::default()
    };
    EmbeddingClient::new(Arc::new(provider), Arc::new(TokenizerRegistry::new())).with_config(config)
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_vectors_follow_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ReversedEmbeddings)
        .expect(2)
        .mount(&server)
        .await;

    let vectors = client_for(&server)
        .embed(&texts(&["a", "bbb", "cc"]), Some(2), None)
        .await
        .unwrap();

    // Second batch restarts positions at 0.
    assert_eq!(
        vectors,
        vec![vec![1.0, 0.0], vec![3.0, 1.0], vec![2.0, 0.0]]
    );
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ReversedEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let vectors = client_for(&server)
        .embed(&texts(&["hello"]), None, None)
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![5.0, 0.0]]);
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Unsupported model", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .embed(&texts(&["hello"]), None, Some("no-such-model"))
        .await
        .unwrap_err();

    assert!(err.is_generation_failure());
    assert_eq!(err.kind(), FailureKind::Api);
    match err {
        EmbeddingError::GenerationFailed { source } => match *source {
            EmbeddingError::ApiRequest { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Unsupported model");
            }
            other => panic!("unexpected inner error: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_slow_service_times_out_after_all_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(slow_response())
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .embed(&texts(&["hello"]), None, None)
        .await
        .unwrap_err();

    assert!(err.is_generation_failure());
    assert_eq!(err.kind(), FailureKind::Timeout);
}

fn slow_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_delay(Duration::from_secs(2))
        .set_body_json(json!({"data": []}))
}

#[tokio::test]
async fn test_server_error_is_surfaced_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .embed(&texts(&["a", "b"]), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Api);
}

#[tokio::test]
async fn test_processor_over_real_tokenizer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ReversedEmbeddings)
        .mount(&server)
        .await;

    let processor = DocumentProcessor::new(
        Arc::new(client_for(&server)),
        ProcessingConfig::default().with_chunking(20, 5),
    );
    let text = "Retrieval augmented generation grounds answers in documents. ".repeat(10);
    let doc = processor
        .process(text, &ProcessOptions::default())
        .await
        .unwrap();

    assert!(doc.chunks.len() > 1);
    assert_eq!(doc.chunks.len(), doc.embeddings.len());
    assert_eq!(doc.stats.chunk_count, doc.chunks.len());
    assert_eq!(doc.stats.max_chunk_tokens, 20);
}
