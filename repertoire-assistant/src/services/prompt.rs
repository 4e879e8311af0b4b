//! Prompt assembly: persona, history window and the current turn.

use crate::models::{ChatMessage, Message};

/// Sentence the model must return when the context does not answer the question.
pub const FALLBACK_REPLY: &str =
    "I could not find information on this in the Repertoire of Practice of the Security Council.";

/// Stand-in for the context block when retrieval returned nothing.
pub const NO_CONTEXT_PLACEHOLDER: &str = "(no relevant passages found)";

/// Built-in persona used when `PERSONA_PROMPT` is not configured.
pub fn default_persona() -> String {
    format!(
        "You are an assistant answering questions about the Repertoire of Practice of the \
         Security Council. Answer only from the passages given in the Context section of the \
         user's message and name the part and section you relied on. If the context reads \
         \"{NO_CONTEXT_PLACEHOLDER}\" or does not contain the answer, reply with exactly this \
         sentence and nothing else: {FALLBACK_REPLY}"
    )
}

/// How much prior conversation is replayed to the model.
///
/// Stored history is never trimmed; the policy only bounds the prompt window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    #[default]
    Unbounded,
    /// Keep only the last `n` user/assistant turns.
    LastTurns(usize),
}

impl HistoryPolicy {
    /// `0` means unbounded.
    pub fn from_max_turns(max_turns: usize) -> Self {
        if max_turns == 0 {
            HistoryPolicy::Unbounded
        } else {
            HistoryPolicy::LastTurns(max_turns)
        }
    }

    pub fn window<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        match self {
            HistoryPolicy::Unbounded => history,
            HistoryPolicy::LastTurns(turns) => {
                let keep = turns.saturating_mul(2);
                &history[history.len().saturating_sub(keep)..]
            }
        }
    }
}

/// Build the text of the current user turn from context and question.
pub fn build_user_turn(context: &str, question: &str) -> String {
    let context = if context.is_empty() {
        NO_CONTEXT_PLACEHOLDER
    } else {
        context
    };
    format!("Context:\n{context}\n\nQuestion: {question}")
}

/// `[system: persona] + window(history) + [user: current]`.
pub fn assemble(
    persona: &str,
    history: &[Message],
    current: &str,
    policy: HistoryPolicy,
) -> Vec<ChatMessage> {
    let window = policy.window(history);
    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(ChatMessage::system(persona));
    messages.extend(window.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(current));
    messages
}
