//! JSON chat API.

use crate::handlers::session::{expired_session_cookie, SessionContext};
use crate::models::Message;
use crate::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(max = 4000, message = "Message is too long"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// The session cookie is returned whether or not the turn succeeds.
pub async fn send_message(
    State(state): State<AppState>,
    session: SessionContext,
    Json(payload): Json<ChatRequest>,
) -> impl IntoResponse {
    let result = run_turn(&state, &session, payload).await;
    (session.cookie_jar(), result)
}

async fn run_turn(
    state: &AppState,
    session: &SessionContext,
    payload: ChatRequest,
) -> Result<Json<ChatResponse>, AppError> {
    payload.validate()?;

    // held for the whole turn
    let mut conversation = session.slot.lock().await;
    let reply = state.chat.send(&mut conversation, &payload.message).await?;

    Ok(Json(ChatResponse {
        reply: reply.content,
        messages: conversation.messages().to_vec(),
    }))
}

pub async fn history(session: SessionContext) -> impl IntoResponse {
    let messages = session.slot.lock().await.messages().to_vec();
    (
        session.cookie_jar(),
        Json(HistoryResponse {
            session_id: session.session_id.to_string(),
            messages,
        }),
    )
}

pub async fn reset_session(
    State(state): State<AppState>,
    session: SessionContext,
) -> impl IntoResponse {
    state.sessions.remove(&session.session_id);
    (
        expired_session_cookie(),
        Json(serde_json::json!({ "status": "reset" })),
    )
}
