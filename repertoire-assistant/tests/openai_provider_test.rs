//! OpenAI client tests against a local HTTP mock.

use repertoire_assistant::models::{ChatMessage, Role};
use repertoire_assistant::services::providers::openai::{OpenAiConfig, OpenAiProvider};
use repertoire_assistant::services::providers::{
    AssistantProvider, ChatProvider, EmbeddingProvider, GenerationParams, ProviderError,
    RunPolling, RunStatus,
};
use secrecy::Secret;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiConfig {
        api_key: Secret::new("sk-test".to_string()),
        base_url: format!("{}/v1", server.uri()),
        embedding_model: "text-embedding-3-small".to_string(),
        chat_model: "gpt-4o-mini".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn fast_polling() -> RunPolling {
    RunPolling {
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn embed_sends_model_and_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "veto power"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.25, -0.5, 1.0] }],
            "model": "text-embedding-3-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vector = provider(&server).embed("veto power").await.unwrap();

    assert_eq!(vector, vec![0.25, -0.5, 1.0]);
}

#[tokio::test]
async fn rate_limit_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = provider(&server).embed("anything").await.unwrap_err();

    assert_eq!(
        err,
        ProviderError::RateLimited("Embedding: slow down".to_string())
    );
    assert_eq!(err.to_string(), "Rate limited by Embedding: slow down");
}

#[tokio::test]
async fn completion_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 0.5,
            "messages": [
                { "role": "system", "content": "persona" },
                { "role": "user", "content": "question" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "An answer." },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        })))
        .mount(&server)
        .await;

    let messages = vec![ChatMessage::system("persona"), ChatMessage::user("question")];
    let params = GenerationParams {
        temperature: Some(0.5),
        max_tokens: None,
    };
    let response = provider(&server).complete(&messages, &params).await.unwrap();

    assert_eq!(response.text, "An answer.");
    assert_eq!(response.input_tokens, 12);
    assert_eq!(response.output_tokens, 3);
}

#[tokio::test]
async fn upstream_error_body_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .complete(&[ChatMessage::user("q")], &GenerationParams::default())
        .await
        .unwrap_err();

    match err {
        ProviderError::ApiError(message) => assert!(message.contains("model overloaded")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn health_check_reads_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models/gpt-4o-mini"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "gpt-4o-mini" })))
        .mount(&server)
        .await;

    assert!(ChatProvider::health_check(&provider(&server)).await.is_ok());
}

#[tokio::test]
async fn assistant_turn_polls_until_completed() {
    let server = MockServer::start().await;
    let client = provider(&server);

    Mock::given(method("POST"))
        .and(path("/v1/threads"))
        .and(header("openai-beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_abc" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_abc/messages"))
        .and(body_partial_json(json!({ "role": "user", "content": "Was it adopted?" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_abc/runs"))
        .and(body_partial_json(json!({ "assistant_id": "asst_1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_1", "status": "queued" })),
        )
        .mount(&server)
        .await;
    // first poll still running, then completed
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_abc/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_1", "status": "in_progress" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_abc/runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_1", "status": "completed" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_abc/messages"))
        .and(query_param("order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "msg_2",
                    "role": "assistant",
                    "content": [{
                        "type": "text",
                        "text": {
                            "value": "Yes.【4:0†source】",
                            "annotations": [
                                { "type": "file_citation", "text": "【4:0†source】" }
                            ]
                        }
                    }]
                },
                {
                    "id": "msg_1",
                    "role": "user",
                    "content": [{ "type": "text", "text": { "value": "Was it adopted?", "annotations": [] } }]
                }
            ]
        })))
        .mount(&server)
        .await;

    let thread = client.create_thread().await.unwrap();
    client
        .add_message(&thread, Role::User, "Was it adopted?")
        .await
        .unwrap();
    let status = client
        .create_and_poll_run(&thread, "asst_1", fast_polling())
        .await
        .unwrap();
    let messages = client.list_messages(&thread).await.unwrap();

    assert_eq!(thread, "thread_abc");
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::Assistant);
}

#[tokio::test]
async fn run_that_never_finishes_returns_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/thread_slow/runs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_9", "status": "in_progress" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads/thread_slow/runs/run_9"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "run_9", "status": "in_progress" })),
        )
        .mount(&server)
        .await;

    let polling = RunPolling {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(60),
    };
    let status = provider(&server)
        .create_and_poll_run("thread_slow", "asst_1", polling)
        .await
        .unwrap();

    assert_eq!(status, RunStatus::InProgress);
}
