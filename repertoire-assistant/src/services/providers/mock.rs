//! Mock provider implementations for testing.

use super::{
    AssistantProvider, ChatProvider, EmbeddingProvider, GenerationParams, ProviderError,
    ProviderResponse, RunPolling, RunStatus, ThreadMessage, VectorStore,
};
use crate::models::{ChatMessage, RetrievedPassage, Role};
use crate::services::citations::{CitationAnnotation, ContentBlock};
use crate::services::prompt::{FALLBACK_REPLY, NO_CONTEXT_PLACEHOLDER};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock embedding provider returning a fixed-size vector derived from the text.
pub struct MockEmbeddingProvider {
    dimensions: usize,
    failure: Option<ProviderError>,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            failure: None,
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            dimensions: 0,
            failure: Some(error),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let seed = text.len() as f32;
        Ok((0..self.dimensions).map(|i| (seed + i as f32) / 100.0).collect())
    }
}

/// Mock vector store returning a fixed passage list, truncated to the limit.
pub struct MockVectorStore {
    passages: Vec<RetrievedPassage>,
    failure: Option<ProviderError>,
    searches: AtomicUsize,
}

impl MockVectorStore {
    pub fn new(passages: Vec<RetrievedPassage>) -> Self {
        Self {
            passages,
            failure: None,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            passages: Vec::new(),
            failure: Some(error),
            searches: AtomicUsize::new(0),
        }
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn search(
        &self,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedPassage>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.passages.iter().take(limit).cloned().collect())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Mock chat provider that follows the persona's fallback instruction.
///
/// When the last user turn carries no context it answers with
/// [`FALLBACK_REPLY`]; otherwise it returns the configured reply. Every
/// request is recorded for inspection.
pub struct MockChatProvider {
    reply: String,
    failure: Option<ProviderError>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            reply: String::new(),
            failure: Some(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Message lists received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let persona_has_fallback = messages
            .first()
            .map(|m| m.role == Role::System && m.content.contains(FALLBACK_REPLY))
            .unwrap_or(false);
        let without_context = messages
            .last()
            .map(|m| m.content.contains(NO_CONTEXT_PLACEHOLDER))
            .unwrap_or(false);

        let text = if persona_has_fallback && without_context {
            FALLBACK_REPLY.to_string()
        } else {
            self.reply.clone()
        };

        Ok(ProviderResponse {
            input_tokens: messages.iter().map(|m| m.content.len() as u32 / 4).sum(),
            output_tokens: text.len() as u32 / 4,
            text,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Mock assistant service keeping threads in memory.
///
/// Each run finishes with the configured status; a completed run appends the
/// configured reply (with its citation markers) to the thread.
pub struct MockAssistantProvider {
    final_status: RunStatus,
    reply: String,
    citations: Vec<String>,
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
    next_thread: AtomicUsize,
}

impl MockAssistantProvider {
    pub fn new(reply: impl Into<String>, citations: Vec<String>) -> Self {
        Self {
            final_status: RunStatus::Completed,
            reply: reply.into(),
            citations,
            threads: Mutex::new(HashMap::new()),
            next_thread: AtomicUsize::new(1),
        }
    }

    /// Runs end in `status` instead of completing.
    pub fn with_final_status(mut self, status: RunStatus) -> Self {
        self.final_status = status;
        self
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().map(|t| t.len()).unwrap_or_default()
    }

    /// Messages on a thread, oldest first.
    pub fn thread_messages(&self, thread_id: &str) -> Vec<ThreadMessage> {
        self.threads
            .lock()
            .ok()
            .and_then(|t| t.get(thread_id).cloned())
            .unwrap_or_default()
    }

    fn append(&self, thread_id: &str, message: ThreadMessage) -> Result<(), ProviderError> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| ProviderError::ApiError("mock thread store poisoned".to_string()))?;
        threads
            .get_mut(thread_id)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("No thread {}", thread_id)))?
            .push(message);
        Ok(())
    }
}

#[async_trait]
impl AssistantProvider for MockAssistantProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_thread(&self) -> Result<String, ProviderError> {
        let id = format!("thread_{}", self.next_thread.fetch_add(1, Ordering::SeqCst));
        self.threads
            .lock()
            .map_err(|_| ProviderError::ApiError("mock thread store poisoned".to_string()))?
            .insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ProviderError> {
        self.append(
            thread_id,
            ThreadMessage {
                role,
                content: vec![ContentBlock::Text {
                    value: content.to_string(),
                    annotations: Vec::new(),
                }],
            },
        )
    }

    async fn create_and_poll_run(
        &self,
        thread_id: &str,
        _assistant_id: &str,
        _polling: RunPolling,
    ) -> Result<RunStatus, ProviderError> {
        if self.final_status == RunStatus::Completed {
            let value = format!("{}{}", self.reply, self.citations.concat());
            self.append(
                thread_id,
                ThreadMessage {
                    role: Role::Assistant,
                    content: vec![ContentBlock::Text {
                        value,
                        annotations: self
                            .citations
                            .iter()
                            .map(CitationAnnotation::file_citation)
                            .collect(),
                    }],
                },
            )?;
        }
        Ok(self.final_status)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ProviderError> {
        let mut messages = self.thread_messages(thread_id);
        messages.reverse();
        Ok(messages)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
