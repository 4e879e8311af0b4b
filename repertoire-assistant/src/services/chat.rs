//! One chat turn: validate, ask the backend, commit on success.

use crate::models::{Conversation, Message};
use crate::services::backend::{BackendMode, ChatBackend, ChatError};
use crate::services::metrics;
use crate::services::providers::ProviderError;
use std::sync::Arc;

pub struct ChatService {
    backend: Arc<dyn ChatBackend>,
}

impl ChatService {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub fn mode(&self) -> BackendMode {
        self.backend.mode()
    }

    /// Answer `question` within `conversation`.
    ///
    /// On success the user message and the reply are appended together and
    /// the stored reply is returned. On any error the history is untouched.
    #[tracing::instrument(
        skip(self, conversation, question),
        fields(session_id = %conversation.session_id(), mode = %self.backend.mode())
    )]
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        question: &str,
    ) -> Result<Message, ChatError> {
        let mode = self.backend.mode().as_str();
        let result = self.run_turn(conversation, question).await;
        match &result {
            Ok(_) => {
                metrics::record_chat_turn(mode, "ok");
                tracing::info!(messages = conversation.messages().len(), "Chat turn recorded");
            }
            Err(e) => {
                metrics::record_chat_turn(mode, e.outcome());
                tracing::warn!(error = %e, "Chat turn failed");
            }
        }
        result
    }

    async fn run_turn(
        &self,
        conversation: &mut Conversation,
        question: &str,
    ) -> Result<Message, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        if conversation.thread_id().is_none() {
            if let Some(thread_id) = self.backend.open_thread().await? {
                conversation.attach_thread(thread_id);
            }
        }

        let reply = self.backend.respond(conversation, question).await?;
        Ok(conversation
            .record_turn(question.to_string(), reply)
            .clone())
    }

    pub async fn health_check(&self) -> Result<(), ProviderError> {
        self.backend.health_check().await
    }
}
