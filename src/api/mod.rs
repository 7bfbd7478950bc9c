//! Control server for the voice satellite
//!
//! Hosts the WebSocket link to the remote pipeline, an event stream for
//! observers, local start/stop routes and a health probe. Handlers never
//! touch the assistant directly; they enqueue [`ControlCommand`]s for the
//! daemon, which applies them between ticks.

pub mod assist;
pub mod health;
pub mod websocket;

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::trace::TraceLayer;

use crate::assistant::ControllerState;
use crate::events::AssistantEvent;
use crate::pipeline::{AudioSettings, PipelineControl, PipelineEvent, RequestFlags};
use crate::{Error, Result};

use websocket::PeerOutgoing;

/// Work handed from the server tasks to the daemon
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Local request to begin a session
    Start {
        continuous: bool,
        silence_detection: bool,
    },
    /// Local request to end the session
    Stop,
    /// Event reported by the pipeline peer
    Event(PipelineEvent),
    /// Pipeline accepted the run and listens at `address:port`
    StreamStarted { address: IpAddr, port: u16 },
    /// Pipeline could not start the run
    FailedToStart,
}

/// Outbound half of the pipeline link, shared between the socket handler
/// and the assistant
///
/// At most one peer is attached at a time. Sends never block; a full or
/// closed channel counts as failure.
#[derive(Clone, Default)]
pub struct ControlHandle {
    peer: Arc<Mutex<Option<mpsc::Sender<PeerOutgoing>>>>,
}

impl ControlHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a peer; returns false if another peer is already attached
    #[must_use]
    pub fn attach(&self, sender: mpsc::Sender<PeerOutgoing>) -> bool {
        let Ok(mut peer) = self.peer.lock() else {
            return false;
        };

        if peer.as_ref().is_some_and(|current| !current.is_closed()) {
            return false;
        }
        *peer = Some(sender);
        true
    }

    /// Detach `sender` if it is the attached peer
    pub fn detach(&self, sender: &mpsc::Sender<PeerOutgoing>) {
        if let Ok(mut peer) = self.peer.lock() {
            if peer.as_ref().is_some_and(|current| current.same_channel(sender)) {
                *peer = None;
            }
        }
    }

    /// Whether the socket task has taken every queued message
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.peer.lock().is_ok_and(|peer| {
            peer.as_ref().is_none_or(|sender| {
                sender.is_closed() || sender.capacity() == sender.max_capacity()
            })
        })
    }

    /// Queue a message for the attached peer
    pub fn send(&self, message: PeerOutgoing) -> bool {
        let Ok(peer) = self.peer.lock() else {
            return false;
        };

        match peer.as_ref() {
            Some(sender) => match sender.try_send(message) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "could not queue message for pipeline peer");
                    false
                }
            },
            None => false,
        }
    }
}

impl PipelineControl for ControlHandle {
    fn is_connected(&self) -> bool {
        self.peer
            .lock()
            .is_ok_and(|peer| peer.as_ref().is_some_and(|sender| !sender.is_closed()))
    }

    fn start_pipeline(
        &mut self,
        conversation_id: &str,
        flags: RequestFlags,
        audio_settings: &AudioSettings,
    ) -> bool {
        self.send(PeerOutgoing::StartPipeline {
            conversation_id: conversation_id.to_string(),
            flags,
            audio_settings: *audio_settings,
        })
    }

    fn stop_pipeline(&mut self) {
        if !self.send(PeerOutgoing::StopPipeline) {
            tracing::debug!("no pipeline peer to stop");
        }
    }
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Satellite name reported to peers
    pub name: String,
    /// Commands for the daemon
    pub commands: mpsc::Sender<ControlCommand>,
    /// Pipeline link
    pub control: ControlHandle,
    /// Latest controller state
    pub status: watch::Receiver<ControllerState>,
    /// Assistant event feed
    pub events: broadcast::Sender<AssistantEvent>,
}

/// HTTP/WebSocket control server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router(Arc::clone(&self.state)))
            .merge(assist::router(Arc::clone(&self.state)))
            .merge(websocket::router(Arc::clone(&self.state)))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the control port
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn bind(self) -> Result<BoundServer> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Control(format!("failed to bind control server: {e}")))?;

        Ok(BoundServer {
            server: self,
            listener,
        })
    }
}

/// Control server with its port bound, ready to serve
pub struct BoundServer {
    server: ApiServer,
    listener: TcpListener,
}

impl BoundServer {
    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the listener fails
    ///
    /// # Errors
    ///
    /// Returns error if the server stops with an I/O failure
    pub async fn serve(self) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(port = addr.port(), "control server listening");
        }

        axum::serve(
            self.listener,
            self.server
                .router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| Error::Control(format!("control server error: {e}")))?;

        Ok(())
    }

    /// Serve in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.serve().await })
    }
}
