use crate::handlers::session::SessionContext;
use crate::models::Message;
use crate::AppState;
use askama::Template;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub title: String,
    pub caption: String,
    pub greeting: String,
    pub messages: Vec<Message>,
}

pub async fn index(State(state): State<AppState>, session: SessionContext) -> impl IntoResponse {
    let messages = session.slot.lock().await.messages().to_vec();
    let ui = &state.config.ui;
    (
        session.cookie_jar(),
        IndexTemplate {
            title: ui.title.clone(),
            caption: ui.caption.clone(),
            greeting: ui.greeting.clone(),
            messages,
        },
    )
}

/// Liveness: the process is serving requests.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "repertoire-assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.chat.mode().as_str(),
        "sessions": state.sessions.len(),
    }))
}

/// Readiness: the hosted dependencies answer.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.chat.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}
