//! Conversation endpoints.
//!
//! - `POST /chat`: process one turn (blocking model calls run on the
//!   blocking pool while the session lock is held)
//! - `POST /reset`: clear a session

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ResetRequest, ResetResponse};
use crate::messages::{self, UiMessage};
use crate::models::{Language, TurnRequest, TurnResponse};

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// `POST /chat`: one conversational turn.
pub async fn send(
    State(ctx): State<ApiContext>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    if req.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("session_id is required".into()));
    }
    if req.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message too long (max {MAX_MESSAGE_CHARS} chars)"
        )));
    }

    let mut handle = ctx.sessions.acquire(&req.session_id).await?;
    let engine = ctx.engine.clone();
    let response = tokio::task::spawn_blocking(move || engine.handle(&mut handle, &req))
        .await
        .map_err(|e| ApiError::Internal(format!("Turn task failed: {e}")))??;

    Ok(Json(response))
}

/// `POST /reset`: clear state and record of one session.
pub async fn reset(
    State(ctx): State<ApiContext>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    let lang = Language::resolve(req.language.as_deref(), ctx.engine.default_language());
    let Some(session_id) = req.session_id.filter(|id| !id.trim().is_empty()) else {
        return Err(ApiError::BadRequest("session_id is required".into()));
    };

    let mut handle = ctx.sessions.acquire(&session_id).await?;
    tokio::task::spawn_blocking(move || handle.reset(lang))
        .await
        .map_err(|e| ApiError::Internal(format!("Reset task failed: {e}")))??;

    tracing::info!(session = %session_id, "Session reset");
    Ok(Json(ResetResponse {
        message: messages::ui(lang, UiMessage::SessionReset).to_string(),
    }))
}
