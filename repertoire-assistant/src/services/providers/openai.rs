//! OpenAI-compatible provider.
//!
//! One client covers the three OpenAI surfaces this service uses: embeddings,
//! chat completions and the Assistants v2 thread/run API.

use super::{
    ensure_success, AssistantProvider, ChatProvider, EmbeddingProvider, GenerationParams,
    ProviderError, ProviderResponse, RunPolling, RunStatus, ThreadMessage,
};
use crate::models::{ChatMessage, Role};
use crate::services::citations::{AnnotationKind, CitationAnnotation, ContentBlock};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::{TracedClientExt, TracedRequest};
use std::time::Duration;

/// Default OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Number of thread messages fetched when looking for the latest reply.
const THREAD_MESSAGE_PAGE: u32 = 20;

/// OpenAI provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub timeout: Duration,
}

/// Client for OpenAI embeddings, chat completions and assistants.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str) -> TracedRequest {
        self.client
            .traced_post(&self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
    }

    fn get(&self, path: &str) -> TracedRequest {
        self.client
            .traced_get(&self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
    }

    fn assistants_post(&self, path: &str) -> TracedRequest {
        let (name, value) = ASSISTANTS_BETA_HEADER;
        self.post(path).header(name, value)
    }

    fn assistants_get(&self, path: &str) -> TracedRequest {
        let (name, value) = ASSISTANTS_BETA_HEADER;
        self.get(path).header(name, value)
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, ProviderError> {
        let response = self
            .assistants_get(&format!("threads/{}/runs/{}", thread_id, run_id))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let run: RunObject = parse(ensure_success(response, "Assistants").await?).await?;
        Ok(run.status)
    }
}

async fn parse<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "Cannot embed empty text".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.config.embedding_model,
            text_len = text.len(),
            "Requesting embedding"
        );

        let request = EmbeddingsRequest {
            model: &self.config.embedding_model,
            input: text,
        };
        let response = self
            .post("embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let body: EmbeddingsResponse = parse(ensure_success(response, "Embedding").await?).await?;

        body.data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| {
                ProviderError::ApiError("Embedding response contained no vectors".to_string())
            })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.config.chat_model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        tracing::debug!(
            model = %self.config.chat_model,
            message_count = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .post("chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let body: ChatCompletionResponse =
            parse(ensure_success(response, "Chat completion").await?).await?;

        let usage = body.usage.unwrap_or_default();
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ProviderError::ApiError("Chat completion returned no choices".to_string())
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::ApiError(
                "Chat completion was blocked by the content filter".to_string(),
            ));
        }

        let text = choice.message.content.ok_or_else(|| {
            ProviderError::ApiError("Chat completion returned no content".to_string())
        })?;

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .get(&format!("models/{}", self.config.chat_model))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        ensure_success(response, "Models").await.map(|_| ())
    }
}

#[async_trait]
impl AssistantProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai-assistants"
    }

    async fn create_thread(&self) -> Result<String, ProviderError> {
        let response = self
            .assistants_post("threads")
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let thread: ThreadObject = parse(ensure_success(response, "Assistants").await?).await?;

        tracing::info!(thread_id = %thread.id, "Created assistant thread");
        Ok(thread.id)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ProviderError> {
        let request = CreateMessageRequest { role, content };
        let response = self
            .assistants_post(&format!("threads/{}/messages", thread_id))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        ensure_success(response, "Assistants").await.map(|_| ())
    }

    async fn create_and_poll_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        polling: RunPolling,
    ) -> Result<RunStatus, ProviderError> {
        let request = CreateRunRequest { assistant_id };
        let response = self
            .assistants_post(&format!("threads/{}/runs", thread_id))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let run: RunObject = parse(ensure_success(response, "Assistants").await?).await?;

        let deadline = tokio::time::Instant::now() + polling.timeout;
        let mut status = run.status;
        while !status.is_terminal() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    thread_id = %thread_id,
                    run_id = %run.id,
                    status = status.as_str(),
                    "Assistant run did not finish before the polling timeout"
                );
                break;
            }
            tokio::time::sleep(polling.interval).await;
            status = self.run_status(thread_id, &run.id).await?;
        }

        tracing::debug!(
            thread_id = %thread_id,
            run_id = %run.id,
            status = status.as_str(),
            "Assistant run settled"
        );
        Ok(status)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ProviderError> {
        let response = self
            .assistants_get(&format!(
                "threads/{}/messages?order=desc&limit={}",
                thread_id, THREAD_MESSAGE_PAGE
            ))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let page: MessageList = parse(ensure_success(response, "Assistants").await?).await?;

        Ok(page.data.into_iter().map(ThreadMessage::from).collect())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        ChatProvider::health_check(self).await
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ApiThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiThreadMessage {
    role: Role,
    #[serde(default)]
    content: Vec<ApiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: ApiText,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    value: String,
    #[serde(default)]
    annotations: Vec<ApiAnnotation>,
}

#[derive(Debug, Deserialize)]
struct ApiAnnotation {
    #[serde(rename = "type")]
    kind: AnnotationKind,
    #[serde(default)]
    text: String,
}

impl From<ApiThreadMessage> for ThreadMessage {
    fn from(message: ApiThreadMessage) -> Self {
        let content = message
            .content
            .into_iter()
            .map(|block| match block {
                ApiContent::Text { text } => ContentBlock::Text {
                    value: text.value,
                    annotations: text
                        .annotations
                        .into_iter()
                        .map(|a| CitationAnnotation {
                            kind: a.kind,
                            text: a.text,
                        })
                        .collect(),
                },
                ApiContent::Other => ContentBlock::Other,
            })
            .collect();

        Self {
            role: message.role,
            content,
        }
    }
}
