pub mod conversation;
pub mod message;
pub mod passage;

pub use conversation::Conversation;
pub use message::{ChatMessage, Message, Role};
pub use passage::RetrievedPassage;
