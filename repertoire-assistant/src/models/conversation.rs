//! Per-session conversation state.

use crate::models::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One browser session's conversation.
///
/// History is append-only: the only mutation is [`Conversation::record_turn`],
/// which appends a user message and the assistant reply together.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    session_id: Uuid,

    messages: Vec<Message>,

    /// External thread handle when the stateful assistant backend is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            messages: Vec::new(),
            thread_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Attach the external thread. A thread, once set, is never replaced.
    pub fn attach_thread(&mut self, thread_id: String) {
        if self.thread_id.is_none() {
            self.thread_id = Some(thread_id);
            self.updated_at = Utc::now();
        }
    }

    /// Append a completed turn and return the stored assistant message.
    pub fn record_turn(&mut self, question: String, reply: String) -> &Message {
        self.messages.push(Message::user(question));
        self.messages.push(Message::assistant(reply));
        self.updated_at = Utc::now();
        &self.messages[self.messages.len() - 1]
    }
}
