//! Local session control
//!
//! Lets buttons, scripts or automations start and stop a session the same
//! way a push-to-talk press would.

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;

use super::{ApiState, ControlCommand};

/// Body of `POST /assist/start`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StartRequest {
    /// Restart automatically after each turn
    #[serde(default)]
    pub continuous: bool,

    /// Ask the pipeline to end the turn on silence
    #[serde(default = "default_silence_detection")]
    pub silence_detection: bool,
}

impl Default for StartRequest {
    fn default() -> Self {
        Self {
            continuous: false,
            silence_detection: default_silence_detection(),
        }
    }
}

const fn default_silence_detection() -> bool {
    true
}

/// Build assist router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/assist/start", post(start))
        .route("/assist/stop", post(stop))
        .with_state(state)
}

async fn start(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<StartRequest>,
) -> StatusCode {
    enqueue(
        &state,
        ControlCommand::Start {
            continuous: request.continuous,
            silence_detection: request.silence_detection,
        },
    )
    .await
}

async fn stop(State(state): State<Arc<ApiState>>) -> StatusCode {
    enqueue(&state, ControlCommand::Stop).await
}

async fn enqueue(state: &ApiState, command: ControlCommand) -> StatusCode {
    match state.commands.send(command).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => {
            tracing::warn!("assistant is not running, dropping request");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_uses_defaults() {
        let request: StartRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.continuous);
        assert!(request.silence_detection);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let request: StartRequest =
            serde_json::from_str(r#"{"continuous":true,"silence_detection":false}"#).unwrap();
        assert!(request.continuous);
        assert!(!request.silence_detection);
    }
}
