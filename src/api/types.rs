//! Shared state and wire types for the HTTP layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::TurnEngine;
use crate::session::SessionStore;

/// Shared context for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<TurnEngine>,
    pub sessions: Arc<SessionStore>,
}

impl ApiContext {
    pub fn new(engine: Arc<TurnEngine>, sessions: Arc<SessionStore>) -> Self {
        Self { engine, sessions }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub specialties: Vec<String>,
    pub active_sessions: usize,
}
