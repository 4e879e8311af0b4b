//! Hosted-service provider abstractions and implementations.
//!
//! Each external dependency (embedding, vector search, chat completion,
//! stateful assistant) sits behind a trait so backends can be wired to the
//! real HTTP clients or to the in-process mocks.

pub mod mock;
pub mod openai;
pub mod weaviate;

use crate::models::{ChatMessage, RetrievedPassage, Role};
use crate::services::citations::ContentBlock;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// Map a non-success HTTP response to a [`ProviderError`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    api: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 {
        let body = body.trim();
        return Err(ProviderError::RateLimited(if body.is_empty() {
            api.to_string()
        } else {
            format!("{}: {}", api, body)
        }));
    }
    Err(ProviderError::ApiError(format!(
        "{} API error {}: {}",
        api, status, body
    )))
}

/// Generation parameters for chat completions.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
}

/// Result of a chat completion.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Turns free text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Nearest-neighbour search over the stored corpus.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Top-`limit` passages closest to `vector`, best match first.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedPassage>, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Single-shot chat completion.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Lifecycle state of a server-side assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Whether the run will not change state any further without client action.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        }
    }
}

/// How long to wait for a run and how often to check on it.
#[derive(Debug, Clone, Copy)]
pub struct RunPolling {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RunPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(120),
        }
    }
}

/// A message read back from an assistant thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Hosted assistant with server-side threads and runs.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_thread(&self) -> Result<String, ProviderError>;

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ProviderError>;

    /// Start a run and wait for it to reach a terminal status or for the
    /// polling timeout, returning the last status seen.
    async fn create_and_poll_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        polling: RunPolling,
    ) -> Result<RunStatus, ProviderError>;

    /// Thread messages, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}
