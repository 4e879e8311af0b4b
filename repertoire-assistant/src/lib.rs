pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use config::AssistantConfig;
use services::{ChatService, SessionStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AssistantConfig>,
    pub chat: Arc<ChatService>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: AssistantConfig, chat: ChatService) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session.ttl));
        Self {
            config: Arc::new(config),
            chat: Arc::new(chat),
            sessions,
        }
    }
}
