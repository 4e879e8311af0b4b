//! Chat backends: how one question becomes one reply.
//!
//! A deployment runs exactly one backend, chosen by `ASSISTANT_MODE`:
//! - [`StatelessRagBackend`] retrieves passages itself and sends the whole
//!   prompt (persona, history window, context, question) on every turn.
//! - [`AssistantBackend`] delegates retrieval and history to a hosted
//!   assistant thread and only forwards the question.

use crate::models::{Conversation, Role};
use crate::services::citations::clean_content_blocks;
use crate::services::context::format_context;
use crate::services::metrics::observe_provider_call;
use crate::services::prompt::{assemble, build_user_turn, HistoryPolicy};
use crate::services::providers::{
    AssistantProvider, ChatProvider, EmbeddingProvider, GenerationParams, ProviderError,
    RunPolling, RunStatus, VectorStore,
};
use async_trait::async_trait;
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Notice shown when a hosted run has not finished.
pub const STILL_PROCESSING_NOTICE: &str = "Assistant is still processing. Try again.";

/// Which backend a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    #[default]
    Stateless,
    Assistant,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Stateless => "stateless",
            BackendMode::Assistant => "assistant",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stateless" | "rag" => Ok(BackendMode::Stateless),
            "assistant" | "stateful" => Ok(BackendMode::Assistant),
            other => Err(format!(
                "unknown assistant mode {:?}, expected \"stateless\" or \"assistant\"",
                other
            )),
        }
    }
}

/// Failure of a single chat turn. The conversation is never modified when
/// one of these is returned.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Upstream(#[from] ProviderError),

    #[error("Assistant run ended with status {}", .status.as_str())]
    RunIncomplete { status: RunStatus },

    #[error("Message must not be empty")]
    EmptyMessage,
}

impl ChatError {
    /// Outcome label for turn metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ChatError::Upstream(_) => "upstream_error",
            ChatError::RunIncomplete { .. } => "incomplete",
            ChatError::EmptyMessage => "rejected",
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Upstream(e) => AppError::BadGateway(e.to_string()),
            ChatError::RunIncomplete { .. } => {
                AppError::ServiceUnavailable(STILL_PROCESSING_NOTICE.to_string())
            }
            ChatError::EmptyMessage => {
                AppError::Unprocessable(anyhow::anyhow!("Message must not be empty"))
            }
        }
    }
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn mode(&self) -> BackendMode;

    /// Create the external thread a new conversation is bound to, if the
    /// backend keeps one.
    async fn open_thread(&self) -> Result<Option<String>, ChatError>;

    /// Produce the reply to `question` given the conversation so far.
    async fn respond(&self, conversation: &Conversation, question: &str)
        -> Result<String, ChatError>;

    /// Check that every hosted dependency is reachable.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

pub struct StatelessRagBackend {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatProvider>,
    persona: String,
    top_k: usize,
    history: HistoryPolicy,
    params: GenerationParams,
}

impl StatelessRagBackend {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatProvider>,
        persona: String,
    ) -> Self {
        Self {
            embedder,
            store,
            chat,
            persona,
            top_k: 10,
            history: HistoryPolicy::LastTurns(10),
            params: GenerationParams {
                temperature: Some(0.2),
                max_tokens: None,
            },
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_history(mut self, history: HistoryPolicy) -> Self {
        self.history = history;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl ChatBackend for StatelessRagBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Stateless
    }

    async fn open_thread(&self) -> Result<Option<String>, ChatError> {
        Ok(None)
    }

    async fn respond(
        &self,
        conversation: &Conversation,
        question: &str,
    ) -> Result<String, ChatError> {
        let vector = observe_provider_call(
            self.embedder.name(),
            "embed",
            self.embedder.embed(question),
        )
        .await?;

        let passages = observe_provider_call(
            self.store.name(),
            "search",
            self.store.search(&vector, self.top_k),
        )
        .await?;
        tracing::debug!(passages = passages.len(), "Retrieved passages");

        let context = format_context(&passages);
        let current = build_user_turn(&context, question);
        let messages = assemble(&self.persona, conversation.messages(), &current, self.history);

        let response = observe_provider_call(
            self.chat.name(),
            "complete",
            self.chat.complete(&messages, &self.params),
        )
        .await?;

        tracing::debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Chat completion finished"
        );

        Ok(response.text.trim().to_string())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.store.health_check().await?;
        self.chat.health_check().await
    }
}

pub struct AssistantBackend {
    provider: Arc<dyn AssistantProvider>,
    assistant_id: String,
    polling: RunPolling,
}

impl AssistantBackend {
    pub fn new(provider: Arc<dyn AssistantProvider>, assistant_id: String) -> Self {
        Self {
            provider,
            assistant_id,
            polling: RunPolling::default(),
        }
    }

    pub fn with_polling(mut self, polling: RunPolling) -> Self {
        self.polling = polling;
        self
    }
}

#[async_trait]
impl ChatBackend for AssistantBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Assistant
    }

    async fn open_thread(&self) -> Result<Option<String>, ChatError> {
        let thread_id = observe_provider_call(
            self.provider.name(),
            "create_thread",
            self.provider.create_thread(),
        )
        .await?;
        tracing::info!(thread_id = %thread_id, "Opened assistant thread");
        Ok(Some(thread_id))
    }

    async fn respond(
        &self,
        conversation: &Conversation,
        question: &str,
    ) -> Result<String, ChatError> {
        let thread_id = conversation.thread_id().ok_or_else(|| {
            ProviderError::InvalidRequest("Conversation has no assistant thread".to_string())
        })?;
        let provider = self.provider.name();

        observe_provider_call(
            provider,
            "add_message",
            self.provider.add_message(thread_id, Role::User, question),
        )
        .await?;

        let status = observe_provider_call(
            provider,
            "run",
            self.provider
                .create_and_poll_run(thread_id, &self.assistant_id, self.polling),
        )
        .await?;

        if status != RunStatus::Completed {
            tracing::warn!(thread_id, status = status.as_str(), "Assistant run not completed");
            return Err(ChatError::RunIncomplete { status });
        }

        let messages = observe_provider_call(
            provider,
            "list_messages",
            self.provider.list_messages(thread_id),
        )
        .await?;

        let reply = messages
            .iter()
            .find(|m| m.role == Role::Assistant)
            .ok_or_else(|| ProviderError::ApiError("Assistant thread has no reply".to_string()))?;

        Ok(clean_content_blocks(&reply.content))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.provider.health_check().await
    }
}
