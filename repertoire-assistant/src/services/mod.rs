pub mod backend;
pub mod chat;
pub mod citations;
pub mod context;
pub mod metrics;
pub mod prompt;
pub mod providers;
pub mod session_store;

pub use backend::{AssistantBackend, BackendMode, ChatBackend, ChatError, StatelessRagBackend};
pub use chat::ChatService;
pub use session_store::{SessionSlot, SessionStore};
