//! Assistant lifecycle events
//!
//! The assistant fires an [`AssistantEvent`] at each milestone of a turn.
//! Listeners are plain closures registered on the [`EventBus`]; firing is
//! synchronous and best-effort, so a listener must not block.

use serde::Serialize;
use tokio::sync::broadcast;

/// Lifecycle milestone of one assistant turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// Remote pipeline accepted the run
    RunStart,
    /// Remote wake word detection fired
    WakeWordDetected,
    /// Speech-to-text started listening
    Listening,
    /// Transcript ready
    SttEnd { text: String },
    /// Response text ready
    TtsStart { text: String },
    /// Response audio ready at `url`
    TtsEnd { url: String },
    /// Run finished
    End,
    /// Run failed
    Error { code: String, message: String },
}

impl AssistantEvent {
    /// Stable event name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::WakeWordDetected => "wake_word_detected",
            Self::Listening => "listening",
            Self::SttEnd { .. } => "stt_end",
            Self::TtsStart { .. } => "tts_start",
            Self::TtsEnd { .. } => "tts_end",
            Self::End => "end",
            Self::Error { .. } => "error",
        }
    }
}

type Listener = Box<dyn FnMut(&AssistantEvent)>;

/// Ordered list of event listeners
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    /// Create a bus with no listeners
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus whose only listener logs every event
    #[must_use]
    pub fn with_logging() -> Self {
        let mut bus = Self::new();
        bus.subscribe(log_event);
        bus
    }

    /// Register a listener; listeners run in registration order
    pub fn subscribe(&mut self, listener: impl FnMut(&AssistantEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Forward every event into a broadcast channel
    ///
    /// Events fired while nobody is subscribed to the channel are dropped.
    pub fn forward_to(&mut self, sender: broadcast::Sender<AssistantEvent>) {
        self.subscribe(move |event| {
            let _ = sender.send(event.clone());
        });
    }

    /// Deliver `event` to every listener
    pub fn fire(&mut self, event: &AssistantEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    /// Number of registered listeners
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

fn log_event(event: &AssistantEvent) {
    match event {
        AssistantEvent::SttEnd { text } => tracing::info!(text, "speech recognized"),
        AssistantEvent::TtsStart { text } => tracing::info!(text, "response ready"),
        AssistantEvent::TtsEnd { url } => tracing::info!(url, "response audio ready"),
        AssistantEvent::Error { code, message } => {
            tracing::info!(code, message, "assistant error");
        }
        other => tracing::info!(event = other.name(), "assistant event"),
    }
}
