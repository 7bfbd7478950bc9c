//! Controller state

use std::fmt;

use serde::Serialize;

/// Current (or desired) phase of an assistant turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    #[default]
    Idle,
    StartMicrophone,
    StartingMicrophone,
    WaitForVad,
    WaitingForVad,
    StartPipeline,
    StartingPipeline,
    StreamingMicrophone,
    StopMicrophone,
    StoppingMicrophone,
    AwaitingResponse,
    StreamingResponse,
    ResponseFinished,
}

impl ControllerState {
    /// Log name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::StartMicrophone => "START_MICROPHONE",
            Self::StartingMicrophone => "STARTING_MICROPHONE",
            Self::WaitForVad => "WAIT_FOR_VAD",
            Self::WaitingForVad => "WAITING_FOR_VAD",
            Self::StartPipeline => "START_PIPELINE",
            Self::StartingPipeline => "STARTING_PIPELINE",
            Self::StreamingMicrophone => "STREAMING_MICROPHONE",
            Self::StopMicrophone => "STOP_MICROPHONE",
            Self::StoppingMicrophone => "STOPPING_MICROPHONE",
            Self::AwaitingResponse => "AWAITING_RESPONSE",
            Self::StreamingResponse => "STREAMING_RESPONSE",
            Self::ResponseFinished => "RESPONSE_FINISHED",
        }
    }

    /// Whether the microphone is being shut down
    #[must_use]
    pub const fn is_stopping_microphone(self) -> bool {
        matches!(self, Self::StopMicrophone | Self::StoppingMicrophone)
    }

    /// Whether a response is pending or playing
    #[must_use]
    pub const fn is_responding(self) -> bool {
        matches!(
            self,
            Self::AwaitingResponse | Self::StreamingResponse | Self::ResponseFinished
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
