//! WebSocket handlers: the pipeline peer link and the event stream

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use super::{ApiState, ControlCommand};
use crate::pipeline::{AudioSettings, PipelineEvent, RequestFlags};

/// Message from the pipeline peer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerIncoming {
    /// Pipeline progress event
    Event(PipelineEvent),
    /// Answer to `start_pipeline`: where to stream audio, or a failure
    PipelineStarted {
        #[serde(default)]
        port: u16,
        #[serde(default)]
        error: bool,
    },
    /// Keepalive
    Ping,
}

/// Message to the pipeline peer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerOutgoing {
    /// Sent once on connect
    Hello { name: String, version: String },
    /// Request a pipeline run
    StartPipeline {
        conversation_id: String,
        flags: RequestFlags,
        audio_settings: AudioSettings,
    },
    /// Abort the current run
    StopPipeline,
    /// Keepalive answer
    Pong,
    /// Protocol error
    Error { code: String, message: String },
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/pipeline", get(pipeline_upgrade))
        .route("/events", get(events_upgrade))
        .with_state(state)
}

async fn pipeline_upgrade(
    State(state): State<Arc<ApiState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_pipeline_socket(socket, state, peer))
}

/// Serve one pipeline peer until it disconnects
async fn handle_pipeline_socket(socket: WebSocket, state: Arc<ApiState>, peer: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<PeerOutgoing>(32);

    if !state.control.attach(tx.clone()) {
        tracing::warn!(%peer, "rejecting pipeline peer, another is connected");
        let busy = PeerOutgoing::Error {
            code: "busy".to_string(),
            message: "Another pipeline is already connected.".to_string(),
        };
        if let Ok(msg) = serde_json::to_string(&busy) {
            let _ = sender.send(Message::Text(msg.into())).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    tracing::info!(%peer, "pipeline peer connected");

    let hello = PeerOutgoing::Hello {
        name: state.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let _ = tx.try_send(hello);

    // Forward queued messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let recv_state = Arc::clone(&state);
    let recv_tx = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let handled =
                        handle_peer_message(&text, peer.ip(), &recv_state, &recv_tx).await;
                    if let Err(e) = handled {
                        tracing::warn!(error = %e, "bad message from pipeline peer");
                        let _ = recv_tx.try_send(PeerOutgoing::Error {
                            code: "invalid_message".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
                Message::Close(_) => {
                    tracing::info!(%peer, "pipeline peer closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.control.detach(&tx);
    tracing::info!(%peer, "pipeline peer disconnected");
}

/// Handle a single message from the pipeline peer
///
/// # Errors
///
/// Returns error if the message is malformed or the daemon has stopped
pub async fn handle_peer_message(
    text: &str,
    peer_ip: IpAddr,
    state: &ApiState,
    tx: &mpsc::Sender<PeerOutgoing>,
) -> crate::Result<()> {
    let incoming: PeerIncoming = serde_json::from_str(text)?;

    let command = match incoming {
        PeerIncoming::Ping => {
            let _ = tx.try_send(PeerOutgoing::Pong);
            return Ok(());
        }
        PeerIncoming::Event(event) => ControlCommand::Event(event),
        PeerIncoming::PipelineStarted { error: true, .. } => ControlCommand::FailedToStart,
        PeerIncoming::PipelineStarted { port, error: false } => ControlCommand::StreamStarted {
            address: peer_ip,
            port,
        },
    };

    state
        .commands
        .send(command)
        .await
        .map_err(|_| crate::Error::Control("assistant is not running".to_string()))
}

async fn events_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| handle_events_socket(socket, events))
}

/// Stream assistant events to an observer until either side closes
async fn handle_events_socket(
    socket: WebSocket,
    mut events: broadcast::Receiver<crate::events::AssistantEvent>,
) {
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!("event observer connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event observer lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("event observer disconnected");
}
