//! Application startup and lifecycle management.

use crate::config::AssistantConfig;
use crate::handlers::{
    app::{health_check, index, readiness_check},
    chat::{history, reset_session, send_message},
    metrics::metrics,
};
use crate::services::providers::openai::{OpenAiConfig, OpenAiProvider};
use crate::services::providers::weaviate::{WeaviateConfig, WeaviateVectorStore};
use crate::services::providers::{GenerationParams, ProviderError};
use crate::services::{AssistantBackend, BackendMode, ChatBackend, ChatService, StatelessRagBackend};
use crate::AppState;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use service_core::observability::REQUEST_ID_HEADER;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Wire the configured backend to its hosted providers.
pub fn build_backend(config: &AssistantConfig) -> Result<Arc<dyn ChatBackend>, ProviderError> {
    let openai = Arc::new(OpenAiProvider::new(OpenAiConfig {
        api_key: config.openai.api_key.clone(),
        base_url: config.openai.base_url.clone(),
        embedding_model: config.openai.embedding_model.clone(),
        chat_model: config.openai.chat_model.clone(),
        timeout: config.openai.timeout,
    })?);

    let backend: Arc<dyn ChatBackend> = match config.mode {
        BackendMode::Stateless => {
            let url = config.weaviate.url.clone().ok_or_else(|| {
                ProviderError::NotConfigured("WEAVIATE_URL is required in stateless mode".to_string())
            })?;
            let store = Arc::new(WeaviateVectorStore::new(WeaviateConfig {
                url,
                api_key: config.weaviate.api_key.clone(),
                collection: config.weaviate.collection.clone(),
                text_property: config.weaviate.text_property.clone(),
                timeout: config.weaviate.timeout,
            })?);

            tracing::info!(
                embedding_model = %config.openai.embedding_model,
                chat_model = %config.openai.chat_model,
                collection = %config.weaviate.collection,
                top_k = config.rag.top_k,
                "Initialized stateless RAG backend"
            );

            Arc::new(
                StatelessRagBackend::new(openai.clone(), store, openai, config.rag.persona.clone())
                    .with_top_k(config.rag.top_k)
                    .with_history(config.rag.history)
                    .with_params(GenerationParams {
                        temperature: Some(config.openai.temperature),
                        max_tokens: None,
                    }),
            )
        }
        BackendMode::Assistant => {
            let assistant_id = config.assistant.assistant_id.clone().ok_or_else(|| {
                ProviderError::NotConfigured("ASSISTANT_ID is required in assistant mode".to_string())
            })?;

            tracing::info!(assistant_id = %assistant_id, "Initialized assistant backend");

            Arc::new(
                AssistantBackend::new(openai, assistant_id).with_polling(config.assistant.polling),
            )
        }
    };

    Ok(backend)
}

pub fn build_state(config: AssistantConfig) -> Result<AppState, AppError> {
    let backend = build_backend(&config).map_err(|e| AppError::ConfigError(e.into()))?;
    Ok(AppState::new(config, ChatService::new(backend)))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .route("/api/chat", post(send_message))
        .route("/api/history", get(history))
        .route("/api/session/reset", post(reset_session))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // outermost, so the trace span sees the request id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: AssistantConfig) -> Result<Self, AppError> {
        let address = config.common.address();
        let state = build_state(config)?;

        // port 0 = random port for testing
        let listener = TcpListener::bind(address.as_str()).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            mode = %state.chat.mode(),
            "Repertoire assistant listening"
        );

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let sweeper = self
            .state
            .sessions
            .spawn_sweeper(self.state.config.session.sweep_interval);

        let router = build_router(self.state);
        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();
        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
