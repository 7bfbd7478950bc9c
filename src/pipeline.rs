//! Remote pipeline vocabulary
//!
//! Event types the remote speech pipeline reports, the flags and audio
//! settings sent when requesting a run, and the control capability the
//! assistant uses to start and stop runs.

use serde::{Deserialize, Serialize};

/// Kind of event reported by the remote pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventType {
    RunStart,
    RunEnd,
    WakeWordStart,
    WakeWordEnd,
    SttStart,
    SttEnd,
    IntentEnd,
    TtsStart,
    TtsEnd,
    Error,
    TtsStreamStart,
    TtsStreamEnd,
    /// Anything this satellite does not act on
    #[serde(other)]
    Unknown,
}

/// Named string argument attached to a pipeline event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventArg {
    pub name: String,
    pub value: String,
}

/// Event reported by the remote pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event_type: PipelineEventType,
    #[serde(default)]
    pub data: Vec<EventArg>,
}

impl PipelineEvent {
    /// Create an event without arguments
    #[must_use]
    pub const fn new(event_type: PipelineEventType) -> Self {
        Self {
            event_type,
            data: Vec::new(),
        }
    }

    /// Attach a named argument
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.push(EventArg {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Value of the first argument called `name`
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// Bitfield sent with a pipeline start request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFlags(u32);

impl RequestFlags {
    /// Remote side should run its own VAD on the stream
    pub const USE_VAD: Self = Self(1);
    /// Remote side should run wake word detection on the stream
    pub const USE_WAKE_WORD: Self = Self(2);

    /// No flags set
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit value
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RequestFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for RequestFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Audio processing hints sent with a pipeline start request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub noise_suppression_level: u32,
    pub auto_gain: u32,
    pub volume_multiplier: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            noise_suppression_level: 0,
            auto_gain: 0,
            volume_multiplier: 1.0,
        }
    }
}

/// Control channel to the remote pipeline
///
/// Calls never block; `start_pipeline` only reports whether the request
/// could be queued.
pub trait PipelineControl {
    /// Whether a pipeline peer is connected
    fn is_connected(&self) -> bool;

    /// Ask the peer to start a run
    fn start_pipeline(
        &mut self,
        conversation_id: &str,
        flags: RequestFlags,
        audio_settings: &AudioSettings,
    ) -> bool;

    /// Ask the peer to stop the current run
    fn stop_pipeline(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_parses_with_arguments() {
        let json = r#"{"event_type":"stt_end","data":[{"name":"text","value":"turn on the light"}]}"#;
        let event: PipelineEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, PipelineEventType::SttEnd);
        assert_eq!(event.arg("text"), Some("turn on the light"));
        assert_eq!(event.arg("url"), None);
    }

    #[test]
    fn unrecognized_event_type_is_unknown() {
        let json = r#"{"event_type":"intent_progress"}"#;
        let event: PipelineEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type, PipelineEventType::Unknown);
        assert!(event.data.is_empty());
    }

    #[test]
    fn first_matching_argument_wins() {
        let event = PipelineEvent::new(PipelineEventType::Error)
            .with_arg("code", "timeout")
            .with_arg("code", "other");
        assert_eq!(event.arg("code"), Some("timeout"));
    }

    #[test]
    fn flags_combine() {
        let flags = RequestFlags::USE_VAD | RequestFlags::USE_WAKE_WORD;
        assert_eq!(flags.bits(), 3);
        assert!(flags.contains(RequestFlags::USE_WAKE_WORD));
        assert!(!RequestFlags::empty().contains(RequestFlags::USE_VAD));
        assert_eq!(serde_json::to_string(&flags).unwrap(), "3");
    }
}
