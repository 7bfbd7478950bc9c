//! Voice Satellite - on-device voice assistant endpoint
//!
//! This library provides the core functionality for a voice satellite:
//! - Assistant turn controller (capture, VAD gating, streaming, playback)
//! - Audio devices and buffers
//! - Datagram transport for streamed audio
//! - Control link to the remote speech pipeline
//! - mDNS discovery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Remote speech pipeline                  │
//! └───────────┬──────────────────────────▲──────────────┘
//!   control   │ WebSocket         audio  │ UDP
//! ┌───────────▼──────────────────────────┴──────────────┐
//! │                 Voice Satellite                      │
//! │   Daemon  │  Assistant  │  Transport  │  Control    │
//! └───────────┬─────────────────────────────────────────┘
//!             │
//! ┌───────────▼─────────────────────────────────────────┐
//! │   Microphone  │  VAD  │  Speaker  │  Media player   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod config;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod transport;
pub mod voice;

pub use assistant::{AssistantConfig, ControllerState, VoiceAssistant};
pub use config::Config;
pub use daemon::Daemon;
pub use discovery::MdnsAdvertiser;
pub use error::{Error, Result};
pub use events::{AssistantEvent, EventBus};
pub use pipeline::{AudioSettings, PipelineControl, PipelineEvent, PipelineEventType, RequestFlags};
pub use transport::{Transport, UdpTransport};
