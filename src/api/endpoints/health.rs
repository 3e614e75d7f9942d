use axum::extract::State;
use axum::Json;

use crate::api::types::{ApiContext, HealthResponse};

/// `GET /health`: liveness plus the specialties the router can pick.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        specialties: ctx.engine.specialties().to_vec(),
        active_sessions: ctx.sessions.active_count(),
    })
}
