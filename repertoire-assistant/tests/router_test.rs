//! HTTP surface tests: the full router over mock providers.

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use repertoire_assistant::config::AssistantConfig;
use repertoire_assistant::services::prompt::{default_persona, FALLBACK_REPLY};
use repertoire_assistant::services::providers::mock::{
    MockAssistantProvider, MockChatProvider, MockEmbeddingProvider, MockVectorStore,
};
use repertoire_assistant::services::providers::{ProviderError, RunStatus};
use repertoire_assistant::services::{
    AssistantBackend, ChatBackend, ChatService, StatelessRagBackend,
};
use repertoire_assistant::startup::build_router;
use repertoire_assistant::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn test_config() -> AssistantConfig {
    AssistantConfig::from_lookup(
        service_core::config::Config::default(),
        |key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "WEAVIATE_URL" => Some("http://weaviate.test".to_string()),
            "WEAVIATE_API_KEY" => Some("wv-test".to_string()),
            "APP_TITLE" => Some("Council Helper".to_string()),
            _ => None,
        },
        false,
    )
    .unwrap()
}

fn app_with(backend: Arc<dyn ChatBackend>) -> (Router, AppState) {
    let state = AppState::new(test_config(), ChatService::new(backend));
    (build_router(state.clone()), state)
}

fn stateless(chat: MockChatProvider, store: MockVectorStore) -> Arc<dyn ChatBackend> {
    Arc::new(StatelessRagBackend::new(
        Arc::new(MockEmbeddingProvider::new(8)),
        Arc::new(store),
        Arc::new(chat),
        default_persona(),
    ))
}

fn passage() -> repertoire_assistant::models::RetrievedPassage {
    repertoire_assistant::models::RetrievedPassage {
        text: "Draft resolutions are put to the vote.".to_string(),
        title: "Voting".to_string(),
        part: "II".to_string(),
        section: "6".to_string(),
        intro_note: String::new(),
        source_filename: "part2.pdf".to_string(),
        score: 0.8,
    }
}

fn chat_request(message: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(json!({ "message": message }).to_string()))
        .unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// `name=value` part of the session cookie set on the response.
fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("repertoire_session="))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn chat_turn_returns_reply_and_history() {
    let (app, _) = app_with(stateless(
        MockChatProvider::new("Under Article 27."),
        MockVectorStore::new(vec![passage()]),
    ));

    let response = app
        .oneshot(chat_request("How are votes taken?", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.contains("HttpOnly"));

    let body = json_body(response).await;
    assert_eq!(body["reply"], "Under Article 27.");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "How are votes taken?");
    assert_eq!(body["messages"][1]["role"], "assistant");
}

#[tokio::test]
async fn cookie_keeps_the_conversation() {
    let (app, state) = app_with(stateless(
        MockChatProvider::new("ok"),
        MockVectorStore::new(vec![passage()]),
    ));

    let first = app.clone().oneshot(chat_request("one", None)).await.unwrap();
    let cookie = session_cookie(&first);

    let second = app
        .clone()
        .oneshot(chat_request("two", Some(cookie.as_str())))
        .await
        .unwrap();
    assert_eq!(json_body(second).await["messages"].as_array().unwrap().len(), 4);

    let history = app.oneshot(get("/api/history", Some(cookie.as_str()))).await.unwrap();
    let body = json_body(history).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 4);
    assert_eq!(body["messages"][2]["content"], "two");
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn empty_retrieval_answers_with_fallback() {
    let (app, _) = app_with(stateless(
        MockChatProvider::new("invented answer"),
        MockVectorStore::empty(),
    ));

    let response = app
        .oneshot(chat_request("Who won the 1966 World Cup?", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["reply"], FALLBACK_REPLY);
}

#[tokio::test]
async fn reset_starts_a_new_conversation() {
    let (app, state) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    let first = app.clone().oneshot(chat_request("one", None)).await.unwrap();
    let cookie = session_cookie(&first);

    let reset = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session/reset")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);
    assert!(state.sessions.is_empty());

    let history = app.oneshot(get("/api/history", Some(cookie.as_str()))).await.unwrap();
    let renewed = session_cookie(&history);
    assert_ne!(renewed, cookie);
    assert!(json_body(history).await["messages"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn blank_message_is_unprocessable() {
    let (app, _) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    let response = app.clone().oneshot(chat_request("   ", None)).await.unwrap();
    let cookie = session_cookie(&response);

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let history = app.oneshot(get("/api/history", Some(cookie.as_str()))).await.unwrap();
    assert!(json_body(history).await["messages"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn oversized_message_is_unprocessable() {
    let (app, _) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    let response = app
        .oneshot(chat_request(&"a".repeat(4001), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway_and_keeps_history() {
    let (app, _) = app_with(stateless(
        MockChatProvider::failing(ProviderError::ApiError("insufficient_quota".to_string())),
        MockVectorStore::empty(),
    ));

    let response = app.clone().oneshot(chat_request("q", None)).await.unwrap();
    let cookie = session_cookie(&response);

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "API error: insufficient_quota");

    let history = app.oneshot(get("/api/history", Some(cookie.as_str()))).await.unwrap();
    assert!(json_body(history).await["messages"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn incomplete_run_is_service_unavailable() {
    let provider = MockAssistantProvider::new("late", Vec::new())
        .with_final_status(RunStatus::InProgress);
    let (app, _) = app_with(Arc::new(AssistantBackend::new(
        Arc::new(provider),
        "asst_1".to_string(),
    )));

    let response = app.oneshot(chat_request("q", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await["error"],
        "Assistant is still processing. Try again."
    );
}

#[tokio::test]
async fn assistant_citations_are_stripped() {
    let provider = MockAssistantProvider::new(
        "Resolution 242 was adopted unanimously.",
        vec!["【12:3†part1.pdf】".to_string()],
    );
    let (app, _) = app_with(Arc::new(AssistantBackend::new(
        Arc::new(provider),
        "asst_1".to_string(),
    )));

    let response = app.oneshot(chat_request("Resolution 242?", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["reply"],
        "Resolution 242 was adopted unanimously."
    );
}

#[tokio::test]
async fn index_renders_title_and_greeting() {
    let (app, _) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    let response = app.oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<title>Council Helper</title>"));
    assert!(html.contains("Ask me anything"));
    assert!(html.contains("<footer>Powered by OpenAI</footer>"));
}

#[tokio::test]
async fn health_and_readiness() {
    let (app, _) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    let health = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(json_body(health).await["mode"], "stateless");

    let ready = app.oneshot(get("/ready", None)).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_fails_when_vector_store_is_down() {
    let (app, _) = app_with(stateless(
        MockChatProvider::new("ok"),
        MockVectorStore::failing(ProviderError::NetworkError("connection refused".to_string())),
    ));

    let ready = app.oneshot(get("/ready", None)).await.unwrap();

    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let (app, _) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");
}

#[tokio::test]
async fn metrics_are_exposed() {
    repertoire_assistant::services::metrics::init_metrics().unwrap();
    let (app, _) = app_with(stateless(MockChatProvider::new("ok"), MockVectorStore::empty()));

    app.clone().oneshot(chat_request("q", None)).await.unwrap();
    let response = app.oneshot(get("/metrics", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("chat_turns_total"));
}
