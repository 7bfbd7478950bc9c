//! Health check endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;
use crate::assistant::ControllerState;
use crate::pipeline::PipelineControl;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: String,
    pub version: &'static str,
    /// Current controller state
    pub state: ControllerState,
    /// Whether a pipeline peer is attached
    pub connected: bool,
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// Liveness probe with a snapshot of the assistant
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        state: *state.status.borrow(),
        connected: state.control.is_connected(),
    })
}
